use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::event::Event;

/// Cancellable deadline for the active decision.
///
/// Arming spawns a sleeper that pipes `DeadlineElapsed` back into the event
/// channel. Fires carry the generation they were armed with: a fire that was
/// already queued when the guard was cancelled or re-armed no longer matches
/// and is discarded by the machine as stale, so the cancel/fire race cannot
/// double-resolve a decision.
#[derive(Debug)]
pub(crate) struct TimeoutGuard {
    events: mpsc::Sender<Event>,
    generation: u64,
    sleeper: Option<JoinHandle<()>>,
}

impl TimeoutGuard {
    pub(crate) fn new(events: mpsc::Sender<Event>) -> Self {
        Self {
            events,
            generation: 0,
            sleeper: None,
        }
    }

    /// Arm the guard. Any previously armed deadline is cancelled first.
    pub(crate) fn arm(&mut self, after: Duration) {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let events = self.events.clone();
        self.sleeper = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(Event::DeadlineElapsed { generation }).await;
        }));
    }

    /// Cancel the armed deadline. Idempotent, and safe to call after the
    /// deadline has already fired.
    pub(crate) fn cancel(&mut self) {
        if let Some(sleeper) = self.sleeper.take() {
            sleeper.abort();
        }
    }

    /// Whether a fire with this generation belongs to the currently armed
    /// deadline.
    pub(crate) fn matches(&self, generation: u64) -> bool {
        self.sleeper.is_some() && generation == self.generation
    }

    #[cfg(test)]
    pub(crate) fn current_generation(&self) -> u64 {
        self.generation
    }
}
