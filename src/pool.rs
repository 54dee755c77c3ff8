use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::coordinator::event::Event;
use crate::job::JobKey;

pub type WorkerId = u64;

/// Commands delivered to a worker's mailbox.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Ask whether the worker can take on the job. The worker answers at
    /// most once through `reply`.
    Probe { key: JobKey, reply: ReplyHandle },
    /// The worker won the admission decision and should start the work.
    BeginWork { key: JobKey },
}

/// A worker's answer to an admission probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerReply {
    Accept { key: JobKey, worker: WorkerId },
    Reject { key: JobKey, worker: WorkerId },
}

impl WorkerReply {
    pub fn key(&self) -> JobKey {
        match self {
            WorkerReply::Accept { key, .. } | WorkerReply::Reject { key, .. } => *key,
        }
    }

    pub fn worker(&self) -> WorkerId {
        match self {
            WorkerReply::Accept { worker, .. } | WorkerReply::Reject { worker, .. } => *worker,
        }
    }
}

/// Routes a worker's probe answer back into the coordinator's event loop.
///
/// Replies enter the same single-consumer event channel as everything else,
/// so they are never handled concurrently with other decision state changes.
#[derive(Debug, Clone)]
pub struct ReplyHandle {
    events: mpsc::Sender<Event>,
}

impl ReplyHandle {
    pub(crate) fn new(events: mpsc::Sender<Event>) -> Self {
        Self { events }
    }

    /// Answer the probe with Accept. A send failure means the coordinator is
    /// gone; there is nothing left to tell.
    pub async fn accept(&self, key: JobKey, worker: WorkerId) {
        let _ = self
            .events
            .send(Event::Reply(WorkerReply::Accept { key, worker }))
            .await;
    }

    /// Answer the probe with Reject.
    pub async fn reject(&self, key: JobKey, worker: WorkerId) {
        let _ = self
            .events
            .send(Event::Reply(WorkerReply::Reject { key, worker }))
            .await;
    }
}

/// Write end of a worker's command mailbox.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    commands: mpsc::Sender<WorkerCommand>,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, commands: mpsc::Sender<WorkerCommand>) -> Self {
        Self { id, commands }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }
}

/// Registry of the current worker set.
///
/// Handles are cheap to clone; all clones share one registry, so a dynamic
/// membership count observes registrations made after the pool was attached
/// to a coordinator.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    members: Arc<RwLock<HashMap<WorkerId, WorkerHandle>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_handles(handles: impl IntoIterator<Item = WorkerHandle>) -> Self {
        let pool = Self::new();
        for handle in handles {
            pool.register(handle);
        }
        pool
    }

    /// Add a worker to the pool. A handle with an id already present
    /// replaces the previous one.
    pub fn register(&self, handle: WorkerHandle) {
        let id = handle.id;
        self.members.write().insert(id, handle);
        tracing::info!(worker_id = id, "Worker registered");
    }

    /// Remove a worker from the pool. Returns false if it was not a member.
    pub fn deregister(&self, id: WorkerId) -> bool {
        let removed = self.members.write().remove(&id).is_some();
        if removed {
            tracing::info!(worker_id = id, "Worker deregistered");
        }
        removed
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    /// Deliver an admission probe to every current member. Returns the number
    /// of mailboxes reached; a full or closed mailbox means that worker
    /// simply never replies, which the decision deadline covers.
    pub(crate) fn broadcast(&self, key: JobKey, reply: &ReplyHandle) -> usize {
        let members = self.members.read();
        let mut probed = 0;
        for handle in members.values() {
            let command = WorkerCommand::Probe {
                key,
                reply: reply.clone(),
            };
            match handle.commands.try_send(command) {
                Ok(()) => probed += 1,
                Err(e) => {
                    tracing::warn!(
                        worker_id = handle.id,
                        key = %key,
                        error = %e,
                        "Failed to deliver probe"
                    );
                }
            }
        }
        probed
    }

    /// Tell the one accepting worker to start the work.
    pub(crate) fn begin_work(&self, worker: WorkerId, key: JobKey) {
        let members = self.members.read();
        match members.get(&worker) {
            Some(handle) => {
                if let Err(e) = handle.commands.try_send(WorkerCommand::BeginWork { key }) {
                    tracing::warn!(
                        worker_id = worker,
                        key = %key,
                        error = %e,
                        "Failed to deliver begin-work command"
                    );
                }
            }
            None => {
                tracing::warn!(worker_id = worker, key = %key, "Accepting worker no longer in pool");
            }
        }
    }
}
