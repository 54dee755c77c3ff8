use std::time::Duration;

/// Tunables for one admission coordinator instance.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Bound on how long a decision may stay open awaiting worker replies.
    pub decision_timeout: Duration,
    /// Capacity of the inbound event channel shared by submissions, worker
    /// replies, membership answers, and deadline fires.
    pub event_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_secs(3),
            event_capacity: 256,
        }
    }
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}
