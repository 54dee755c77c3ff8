use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::dispatch::ResultDispatcher;
use crate::error::{GateError, Result};
use crate::job::{AdmittedNotice, Decision, JobKey};
use crate::membership::Membership;
use crate::pool::WorkerPool;

use super::event::Event;
use super::machine::Machine;

/// Handle to a running admission coordinator.
///
/// Cloning is cheap; all clones feed the same event loop, and submissions
/// from concurrent callers are serialized in channel order.
#[derive(Debug, Clone)]
pub struct AdmissionCoordinator {
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
}

/// An accepted submission waiting for its terminal decision.
#[derive(Debug)]
pub struct PendingAdmission {
    key: JobKey,
    decision: oneshot::Receiver<Decision>,
}

impl PendingAdmission {
    pub fn key(&self) -> JobKey {
        self.key
    }

    /// Wait for the terminal decision. A dropped sender means the decision
    /// was abandoned (coordinator fault or shutdown), never that it was
    /// silently lost.
    pub async fn await_decision(self) -> Result<Decision> {
        self.decision
            .await
            .map_err(|_| GateError::DecisionAbandoned)
    }
}

impl AdmissionCoordinator {
    /// Spawn a coordinator over the pool produced by `build_pool`.
    ///
    /// The builder is kept for fault recovery: on an unrecoverable internal
    /// error the current pool handle is discarded and a fresh pool is built.
    /// When `notices` is set, it receives one [`AdmittedNotice`] per
    /// admitted job.
    pub fn spawn(
        config: GateConfig,
        membership: Membership,
        build_pool: impl Fn() -> WorkerPool + Send + 'static,
        notices: Option<mpsc::Sender<AdmittedNotice>>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let shutdown = CancellationToken::new();
        let machine = Machine::new(
            config,
            membership,
            Box::new(build_pool),
            ResultDispatcher::new(notices),
            events_tx.clone(),
        );
        tokio::spawn(run(machine, events_rx, shutdown.clone()));
        Self {
            events: events_tx,
            shutdown,
        }
    }

    /// Submit a job for admission. Returns as soon as the request is queued;
    /// the decision arrives through the returned handle.
    pub async fn submit(&self, key: JobKey) -> Result<PendingAdmission> {
        if self.shutdown.is_cancelled() {
            return Err(GateError::CoordinatorUnavailable);
        }
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::Submit { key, requester: tx })
            .await
            .map_err(|_| GateError::CoordinatorUnavailable)?;
        Ok(PendingAdmission { key, decision: rx })
    }

    /// Submit and wait for the terminal decision.
    pub async fn admit(&self, key: JobKey) -> Result<Decision> {
        self.submit(key).await?.await_decision().await
    }

    /// Request shutdown. Any in-flight decision is abandoned.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Single-consumer event loop: exactly one event is handled to completion
/// before the next is considered, which is what makes the machine lock-free.
async fn run(mut machine: Machine, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
    tracing::info!("Admission coordinator started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                machine.abandon("shutdown requested");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if let Err(e) = machine.process(event) {
                            tracing::error!(error = %e, "Coordinator fault, rebuilding worker pool");
                            machine.recover();
                        }
                    }
                    None => break,
                }
            }
        }
    }
    tracing::info!("Admission coordinator stopped");
}
