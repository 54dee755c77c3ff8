use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::config::GateConfig;
use crate::dispatch::ResultDispatcher;
use crate::error::{GateError, Result};
use crate::job::{Decision, JobKey};
use crate::membership::Membership;
use crate::pool::{ReplyHandle, WorkerId, WorkerPool, WorkerReply};

use super::deferral::DeferralQueue;
use super::event::Event;
use super::tally::QuorumTally;
use super::timeout::TimeoutGuard;

/// Coordinator lifecycle states. The machine cycles between these for its
/// whole lifetime; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// No decision open; submissions are accepted directly.
    Idle,
    /// A decision is open but the expected reply count is still being
    /// resolved; submissions and replies are deferred until it arrives.
    AwaitingMembership,
    /// A decision is open and replies are being tallied; new submissions
    /// are deferred.
    AwaitingQuorum,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "idle"),
            State::AwaitingMembership => write!(f, "awaiting-membership"),
            State::AwaitingQuorum => write!(f, "awaiting-quorum"),
        }
    }
}

/// Why a decision resolved as reject. The caller-visible outcome is the same
/// either way; the distinction only reaches structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectReason {
    AllRejected,
    DeadlineElapsed,
    EmptyPool,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AllRejected => write!(f, "all workers rejected"),
            RejectReason::DeadlineElapsed => write!(f, "deadline elapsed"),
            RejectReason::EmptyPool => write!(f, "no workers in pool"),
        }
    }
}

/// The single in-flight decision. Resolution consumes the value, so a
/// resolved decision cannot be touched again.
#[derive(Debug)]
struct PendingDecision {
    key: JobKey,
    requester: oneshot::Sender<Decision>,
    /// None only while the expected reply count is unresolved.
    tally: Option<QuorumTally>,
    opened_at: Instant,
}

type PoolBuilder = Box<dyn Fn() -> WorkerPool + Send>;

/// The admission state machine.
///
/// # Ordering & Safety
///
/// All decision state is mutated from within a single `process` invocation
/// driven by one consumer task, so nothing here needs a lock:
/// - At most one `PendingDecision` exists at any time; a second submission
///   waits in the deferral queue.
/// - A reply that does not name the pending decision's key, a deadline fire
///   whose generation is no longer armed, and a membership answer for a
///   superseded query are all discarded as stale.
/// - Replayed events pass through the same `handle` dispatch as live ones
///   and keep their original arrival order.
pub(crate) struct Machine {
    config: GateConfig,
    state: State,
    pending: Option<PendingDecision>,
    deferred: DeferralQueue,
    guard: TimeoutGuard,
    pool: WorkerPool,
    build_pool: PoolBuilder,
    membership: Membership,
    membership_generation: u64,
    dispatcher: ResultDispatcher,
    events: mpsc::Sender<Event>,
}

impl Machine {
    pub(crate) fn new(
        config: GateConfig,
        membership: Membership,
        build_pool: PoolBuilder,
        dispatcher: ResultDispatcher,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let pool = build_pool();
        Self {
            guard: TimeoutGuard::new(events.clone()),
            config,
            state: State::Idle,
            pending: None,
            deferred: DeferralQueue::new(),
            pool,
            build_pool,
            membership,
            membership_generation: 0,
            dispatcher,
            events,
        }
    }

    /// Feed one live event through the machine. Whenever a transition leaves
    /// a deferring state, the deferral queue is replayed immediately, ahead
    /// of any event that has not been received yet.
    pub(crate) fn process(&mut self, event: Event) -> Result<()> {
        let mut queue = VecDeque::new();
        queue.push_back(event);
        while let Some(event) = queue.pop_front() {
            let before = self.state;
            self.handle(event)?;
            if self.state != before && !self.deferred.is_empty() {
                let replayed = self.deferred.take_all();
                tracing::debug!(
                    count = replayed.len(),
                    state = %self.state,
                    "Replaying deferred events"
                );
                for event in replayed.into_iter().rev() {
                    queue.push_front(event);
                }
            }
        }
        Ok(())
    }

    /// Transition table: one dispatch over (state, event).
    fn handle(&mut self, event: Event) -> Result<()> {
        match (self.state, event) {
            (State::Idle, Event::Submit { key, requester }) => self.open_decision(key, requester),
            (State::AwaitingMembership, event @ (Event::Submit { .. } | Event::Reply(_)))
            | (State::AwaitingQuorum, event @ Event::Submit { .. }) => {
                self.defer(event);
                Ok(())
            }
            (State::AwaitingMembership, Event::MembershipResolved { size, generation }) => {
                self.on_membership(size, generation)
            }
            (State::AwaitingQuorum, Event::Reply(reply)) => self.on_reply(reply),
            (State::AwaitingQuorum, Event::DeadlineElapsed { generation }) => {
                self.on_deadline(generation)
            }
            // Everything else references a decision that is no longer (or
            // not yet) active.
            (state, event) => {
                tracing::debug!(state = %state, kind = event.kind(), "Discarding stale event");
                Ok(())
            }
        }
    }

    /// Idle + submission: broadcast to the pool, then either adopt the
    /// static size or wait for the membership answer.
    fn open_decision(&mut self, key: JobKey, requester: oneshot::Sender<Decision>) -> Result<()> {
        let reply = ReplyHandle::new(self.events.clone());
        let probed = self.pool.broadcast(key, &reply);
        tracing::debug!(key = %key, probed, "Broadcast admission probe");

        self.pending = Some(PendingDecision {
            key,
            requester,
            tally: None,
            opened_at: Instant::now(),
        });

        match self.membership {
            Membership::Static(size) => self.adopt_pool_size(size),
            Membership::Dynamic => {
                self.membership_generation += 1;
                let generation = self.membership_generation;
                let pool = self.pool.clone();
                let events = self.events.clone();
                // Resolved off the event loop and piped back in, so the
                // answer is never handled concurrently with other events.
                tokio::spawn(async move {
                    let size = pool.member_count();
                    let _ = events
                        .send(Event::MembershipResolved { size, generation })
                        .await;
                });
                self.state = State::AwaitingMembership;
                Ok(())
            }
        }
    }

    /// Capture the pool snapshot for the open decision and start the clock.
    fn adopt_pool_size(&mut self, size: usize) -> Result<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| invariant("pool size adopted with no open decision"))?;

        if size == 0 {
            // zero expected replies: the all-reject quorum is vacuously met
            tracing::warn!(key = %pending.key, "No workers in pool");
            return self.resolve_rejected(RejectReason::EmptyPool);
        }

        tracing::info!(
            key = %pending.key,
            expected = size,
            timeout_ms = self.config.decision_timeout.as_millis() as u64,
            "Decision opened"
        );
        pending.tally = Some(QuorumTally::new(size));
        self.guard.arm(self.config.decision_timeout);
        self.state = State::AwaitingQuorum;
        Ok(())
    }

    fn on_membership(&mut self, size: usize, generation: u64) -> Result<()> {
        if generation != self.membership_generation {
            tracing::debug!(size, generation, "Discarding stale membership answer");
            return Ok(());
        }
        tracing::debug!(size, "Pool membership resolved");
        self.adopt_pool_size(size)
    }

    fn on_reply(&mut self, reply: WorkerReply) -> Result<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| invariant("reply tallied with no open decision"))?;

        if reply.key() != pending.key {
            tracing::debug!(key = %reply.key(), pending = %pending.key, "Discarding reply for a different job");
            return Ok(());
        }

        match reply {
            WorkerReply::Accept { worker, .. } => self.resolve_accepted(worker),
            WorkerReply::Reject { worker, .. } => {
                let tally = pending
                    .tally
                    .as_mut()
                    .ok_or_else(|| invariant("reply tallied before membership resolved"))?;
                if !tally.record_rejection(worker) {
                    tracing::debug!(key = %pending.key, worker_id = worker, "Ignoring duplicate rejection");
                    return Ok(());
                }
                let remaining = tally.remaining();
                if remaining == 0 {
                    self.resolve_rejected(RejectReason::AllRejected)
                } else {
                    tracing::debug!(key = %pending.key, worker_id = worker, remaining, "Rejection tallied");
                    Ok(())
                }
            }
        }
    }

    fn on_deadline(&mut self, generation: u64) -> Result<()> {
        if !self.guard.matches(generation) {
            tracing::debug!(generation, "Discarding stale deadline fire");
            return Ok(());
        }
        self.resolve_rejected(RejectReason::DeadlineElapsed)
    }

    /// First accept wins outright: stop the clock, command the accepting
    /// worker to begin, notify the requester and the presentation
    /// collaborator.
    fn resolve_accepted(&mut self, worker: WorkerId) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| invariant("resolved with no open decision"))?;
        self.guard.cancel();
        self.pool.begin_work(worker, pending.key);
        tracing::info!(
            key = %pending.key,
            worker_id = worker,
            elapsed_ms = pending.opened_at.elapsed().as_millis() as u64,
            "Admission accepted"
        );
        self.dispatcher
            .deliver(pending.requester, Decision::Accepted { key: pending.key });
        self.dispatcher.announce(pending.key, worker);
        self.state = State::Idle;
        Ok(())
    }

    fn resolve_rejected(&mut self, reason: RejectReason) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| invariant("resolved with no open decision"))?;
        self.guard.cancel();
        tracing::info!(
            key = %pending.key,
            reason = %reason,
            elapsed_ms = pending.opened_at.elapsed().as_millis() as u64,
            "Admission rejected"
        );
        self.dispatcher
            .deliver(pending.requester, Decision::Rejected { key: pending.key });
        self.state = State::Idle;
        Ok(())
    }

    fn defer(&mut self, event: Event) {
        tracing::debug!(
            state = %self.state,
            kind = event.kind(),
            queued = self.deferred.len() + 1,
            "Deferring event"
        );
        self.deferred.push(event);
    }

    /// Abandon any open decision without a reply. The requester's channel is
    /// dropped, which the caller observes as `DecisionAbandoned`; deferred
    /// events are discarded.
    pub(crate) fn abandon(&mut self, reason: &str) {
        self.guard.cancel();
        if let Some(pending) = self.pending.take() {
            tracing::warn!(key = %pending.key, reason, "Abandoning in-flight decision");
        }
        let dropped = self.deferred.clear();
        if dropped > 0 {
            tracing::warn!(dropped, reason, "Discarding deferred events");
        }
        self.state = State::Idle;
    }

    /// Fault recovery: abandon the in-flight decision, discard the pool
    /// handle, and build a fresh pool. The waiting caller gets no reply and
    /// must apply its own timeout or retry.
    pub(crate) fn recover(&mut self) {
        self.abandon("coordinator fault");
        self.pool = (self.build_pool)();
        tracing::info!(workers = self.pool.member_count(), "Worker pool rebuilt");
    }
}

fn invariant(message: &str) -> GateError {
    GateError::Internal(message.to_string())
}
