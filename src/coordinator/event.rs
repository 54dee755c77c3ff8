use tokio::sync::oneshot;

use crate::job::{Decision, JobKey};
use crate::pool::WorkerReply;

/// Inbound events for the coordinator's single-consumer loop. Everything
/// that can move the state machine arrives through this one type, including
/// membership answers and deadline fires piped back from spawned tasks.
#[derive(Debug)]
pub(crate) enum Event {
    /// A caller asks whether the pool can take on the job.
    Submit {
        key: JobKey,
        requester: oneshot::Sender<Decision>,
    },
    /// A worker answered an admission probe.
    Reply(WorkerReply),
    /// A membership query resolved with the current pool size.
    MembershipResolved { size: usize, generation: u64 },
    /// The decision deadline fired.
    DeadlineElapsed { generation: u64 },
}

impl Event {
    /// Short name for logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Event::Submit { .. } => "submit",
            Event::Reply(_) => "reply",
            Event::MembershipResolved { .. } => "membership",
            Event::DeadlineElapsed { .. } => "deadline",
        }
    }
}
