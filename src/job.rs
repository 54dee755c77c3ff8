use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pool::WorkerId;

/// Opaque identifier correlating an admission request, its broadcast, and
/// every worker reply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(Uuid);

impl JobKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal outcome of an admission decision, delivered exactly once to the
/// caller that submitted the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accepted { key: JobKey },
    Rejected { key: JobKey },
}

impl Decision {
    pub fn key(&self) -> JobKey {
        match self {
            Decision::Accepted { key } | Decision::Rejected { key } => *key,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted { .. })
    }
}

/// Fire-and-forget notification sent to the presentation collaborator when a
/// job is admitted. Sent once, after resolution, only on accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittedNotice {
    pub key: JobKey,
    pub worker: WorkerId,
    pub admitted_at: DateTime<Utc>,
}
