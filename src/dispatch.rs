use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::job::{AdmittedNotice, Decision, JobKey};
use crate::pool::WorkerId;

/// Delivers terminal decisions to requesters and admission notices to the
/// presentation collaborator.
#[derive(Debug)]
pub(crate) struct ResultDispatcher {
    notices: Option<mpsc::Sender<AdmittedNotice>>,
}

impl ResultDispatcher {
    pub(crate) fn new(notices: Option<mpsc::Sender<AdmittedNotice>>) -> Self {
        Self { notices }
    }

    /// Deliver the terminal decision to the original requester. A dropped
    /// receiver means the caller gave up waiting; the decision stands.
    pub(crate) fn deliver(&self, requester: oneshot::Sender<Decision>, decision: Decision) {
        if let Err(decision) = requester.send(decision) {
            tracing::warn!(key = %decision.key(), "Requester gone before decision delivery");
        }
    }

    /// Fire-and-forget admission notice. Only called on accept; a full or
    /// closed collaborator channel drops the notice rather than blocking the
    /// event loop.
    pub(crate) fn announce(&self, key: JobKey, worker: WorkerId) {
        let Some(notices) = &self.notices else {
            return;
        };
        let notice = AdmittedNotice {
            key,
            worker,
            admitted_at: Utc::now(),
        };
        if let Err(e) = notices.try_send(notice) {
            tracing::warn!(key = %key, worker_id = worker, error = %e, "Failed to deliver admission notice");
        }
    }
}
