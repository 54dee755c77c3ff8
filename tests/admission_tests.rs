//! Integration tests for the admission decision protocol.
//!
//! Workers here are scripted tasks: each one answers probes according to a
//! fixed script, so reply composition and timing are deterministic. Delays
//! are used to force a reply order where a scenario depends on it.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;

use quorum_gate::config::GateConfig;
use quorum_gate::coordinator::AdmissionCoordinator;
use quorum_gate::error::GateError;
use quorum_gate::job::{AdmittedNotice, Decision, JobKey};
use quorum_gate::membership::Membership;
use quorum_gate::pool::{WorkerCommand, WorkerHandle, WorkerId, WorkerPool};

/// How a scripted worker answers each probe it receives.
#[derive(Clone, Copy)]
enum Script {
    Reject,
    RejectAfter(Duration),
    AcceptAfter(Duration),
    /// Never answer.
    Silent,
}

/// What a worker observed, in the order it observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerSaw {
    Probe(WorkerId, JobKey),
    BeginWork(WorkerId, JobKey),
}

/// Build a pool of scripted workers, ids 1..=N in script order. Every worker
/// reports what it sees on the returned channel.
fn scripted_pool(scripts: &[Script]) -> (WorkerPool, mpsc::UnboundedReceiver<WorkerSaw>) {
    let (saw_tx, saw_rx) = mpsc::unbounded_channel();
    let pool = WorkerPool::new();
    for (index, script) in scripts.iter().enumerate() {
        let id = index as WorkerId + 1;
        let (tx, mut rx) = mpsc::channel(16);
        pool.register(WorkerHandle::new(id, tx));
        let script = *script;
        let saw = saw_tx.clone();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WorkerCommand::Probe { key, reply } => {
                        let _ = saw.send(WorkerSaw::Probe(id, key));
                        match script {
                            Script::Reject => reply.reject(key, id).await,
                            Script::RejectAfter(delay) => {
                                tokio::time::sleep(delay).await;
                                reply.reject(key, id).await;
                            }
                            Script::AcceptAfter(delay) => {
                                tokio::time::sleep(delay).await;
                                reply.accept(key, id).await;
                            }
                            Script::Silent => {}
                        }
                    }
                    WorkerCommand::BeginWork { key } => {
                        let _ = saw.send(WorkerSaw::BeginWork(id, key));
                    }
                }
            }
        });
    }
    (pool, saw_rx)
}

fn spawn_gate(
    pool: &WorkerPool,
    membership: Membership,
    decision_timeout: Duration,
) -> (AdmissionCoordinator, mpsc::Receiver<AdmittedNotice>) {
    let (notices_tx, notices_rx) = mpsc::channel(16);
    let config = GateConfig::new().with_decision_timeout(decision_timeout);
    let pool = pool.clone();
    let coordinator =
        AdmissionCoordinator::spawn(config, membership, move || pool.clone(), Some(notices_tx));
    (coordinator, notices_rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerSaw>) -> Vec<WorkerSaw> {
    let mut seen = Vec::new();
    while let Ok(saw) = rx.try_recv() {
        seen.push(saw);
    }
    seen
}

// ---------------------------------------------------------------------------
// Scenario A: two rejections then an accept → admitted, one notice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accept_wins_over_preceding_rejections() {
    let (pool, _saw) = scripted_pool(&[
        Script::Reject,
        Script::Reject,
        Script::AcceptAfter(Duration::from_millis(100)),
    ]);
    let (gate, mut notices) = spawn_gate(&pool, Membership::Static(3), Duration::from_secs(2));

    let key = JobKey::new();
    let decision = gate.admit(key).await.expect("decision delivered");
    assert_eq!(decision, Decision::Accepted { key });

    let notice = timeout(Duration::from_secs(1), notices.recv())
        .await
        .expect("notice in time")
        .expect("notice channel open");
    assert_eq!(notice.key, key);
    assert_eq!(notice.worker, 3);

    // exactly one notice per admitted job
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(notices.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Scenario B: unanimous rejection → rejected, no notice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unanimous_rejection_rejects_without_notice() {
    let (pool, _saw) = scripted_pool(&[Script::Reject, Script::Reject, Script::Reject]);
    let (gate, mut notices) = spawn_gate(&pool, Membership::Static(3), Duration::from_secs(2));

    let key = JobKey::new();
    let decision = gate.admit(key).await.expect("decision delivered");
    assert_eq!(decision, Decision::Rejected { key });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(notices.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Scenario C: too few replies inside the window → rejected at the deadline,
// late accept has no effect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deadline_rejects_and_late_accept_is_ignored() {
    let (pool, mut saw) = scripted_pool(&[
        Script::Reject,
        Script::Reject,
        Script::AcceptAfter(Duration::from_millis(600)),
    ]);
    let (gate, mut notices) = spawn_gate(&pool, Membership::Static(3), Duration::from_millis(150));

    let key = JobKey::new();
    let started = Instant::now();
    let decision = gate.admit(key).await.expect("decision delivered");
    let elapsed = started.elapsed();

    assert_eq!(decision, Decision::Rejected { key });
    assert!(
        elapsed >= Duration::from_millis(100),
        "rejected before the deadline (took {:?})",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(500),
        "deadline overshot (took {:?})",
        elapsed
    );

    // wait out the straggler's accept; it must change nothing
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(notices.try_recv().is_err());
    let late = drain(&mut saw);
    assert!(
        !late.iter().any(|s| matches!(s, WorkerSaw::BeginWork(..))),
        "no worker should have been told to begin: {:?}",
        late
    );
}

// ---------------------------------------------------------------------------
// Rejection resolves exactly at the last expected reply, not earlier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejection_waits_for_every_expected_reply() {
    let (pool, _saw) = scripted_pool(&[
        Script::Reject,
        Script::Reject,
        Script::RejectAfter(Duration::from_millis(200)),
    ]);
    let (gate, _notices) = spawn_gate(&pool, Membership::Static(3), Duration::from_secs(2));

    let key = JobKey::new();
    let started = Instant::now();
    let decision = gate.admit(key).await.expect("decision delivered");
    let elapsed = started.elapsed();

    assert_eq!(decision, Decision::Rejected { key });
    assert!(
        elapsed >= Duration::from_millis(150),
        "resolved before the last rejection arrived (took {:?})",
        elapsed
    );
    assert!(elapsed < Duration::from_secs(1), "deadline should not have fired");
}

// ---------------------------------------------------------------------------
// Scenario D: submissions during an active decision are deferred, then
// dispatched in arrival order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_submissions_resolve_in_arrival_order() {
    let (pool, mut saw) = scripted_pool(&[Script::AcceptAfter(Duration::from_millis(150))]);
    let (gate, _notices) = spawn_gate(&pool, Membership::Static(1), Duration::from_secs(2));

    let first = JobKey::new();
    let second = JobKey::new();
    let third = JobKey::new();

    let admission_one = gate.submit(first).await.expect("submitted");
    tokio::time::sleep(Duration::from_millis(10)).await;
    let admission_two = gate.submit(second).await.expect("submitted");
    let admission_three = gate.submit(third).await.expect("submitted");

    for (admission, key) in [
        (admission_one, first),
        (admission_two, second),
        (admission_three, third),
    ] {
        let decision = admission.await_decision().await.expect("decision delivered");
        assert_eq!(decision, Decision::Accepted { key });
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = drain(&mut saw);
    let expected = vec![
        WorkerSaw::Probe(1, first),
        WorkerSaw::BeginWork(1, first),
        WorkerSaw::Probe(1, second),
        WorkerSaw::BeginWork(1, second),
        WorkerSaw::Probe(1, third),
        WorkerSaw::BeginWork(1, third),
    ];
    assert_eq!(seen, expected);
}

// ---------------------------------------------------------------------------
// Shutdown abandons the in-flight decision and refuses new submissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_abandons_pending_decision() {
    let (pool, _saw) = scripted_pool(&[Script::Silent]);
    let (gate, _notices) = spawn_gate(&pool, Membership::Static(1), Duration::from_secs(10));

    let admission = gate.submit(JobKey::new()).await.expect("submitted");
    tokio::time::sleep(Duration::from_millis(50)).await;

    gate.shutdown();
    let result = admission.await_decision().await;
    assert!(matches!(result, Err(GateError::DecisionAbandoned)));

    let refused = gate.submit(JobKey::new()).await;
    assert!(matches!(refused, Err(GateError::CoordinatorUnavailable)));
}
