use std::collections::VecDeque;

use super::event::Event;

/// FIFO buffer for events that cannot be processed in the current state.
///
/// Arrival order is preserved; replay hands the whole buffer back so events
/// re-enter the machine through the same dispatch path as live ones.
#[derive(Debug, Default)]
pub(crate) struct DeferralQueue {
    events: VecDeque<Event>,
}

impl DeferralQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Take every buffered event, oldest first.
    pub(crate) fn take_all(&mut self) -> VecDeque<Event> {
        std::mem::take(&mut self.events)
    }

    /// Drop every buffered event. Returns how many were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire(generation: u64) -> Event {
        Event::DeadlineElapsed { generation }
    }

    fn generation_of(event: &Event) -> u64 {
        match event {
            Event::DeadlineElapsed { generation } => *generation,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn replay_preserves_arrival_order() {
        let mut queue = DeferralQueue::new();
        for generation in 1..=4 {
            queue.push(fire(generation));
        }
        assert_eq!(queue.len(), 4);

        let order: Vec<u64> = queue.take_all().iter().map(generation_of).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut queue = DeferralQueue::new();
        queue.push(fire(1));
        queue.push(fire(2));

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.clear(), 0);
        assert!(queue.is_empty());
    }
}
