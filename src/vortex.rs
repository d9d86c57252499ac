/// The TimeVortex — a partition's time-ordered queue of pending events.
///
/// A `BinaryHeap` of `Reverse<Event>` acts as a min-heap keyed by
/// `(delivery_time, priority, sequence, origin)`. The key is total, so
/// the pop order depends only on the set of events inserted, never on
/// the order in which they were inserted.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{SimError, SimResult};
use crate::event::Event;
use crate::time::SimTime;

/// Pending events of one partition. Never shared between partitions.
#[derive(Debug, Clone, Default)]
pub struct TimeVortex {
    queue: BinaryHeap<Reverse<Event>>,
}

impl TimeVortex {
    pub fn new() -> Self {
        TimeVortex {
            queue: BinaryHeap::new(),
        }
    }

    /// Queue an event. Causality is the caller's concern: the vortex
    /// has no clock of its own.
    pub fn insert(&mut self, event: Event) {
        self.queue.push(Reverse(event));
    }

    /// Remove and return the smallest event.
    pub fn pop_min(&mut self) -> SimResult<Event> {
        self.queue
            .pop()
            .map(|Reverse(event)| event)
            .ok_or(SimError::EmptyVortex)
    }

    /// The smallest event, if any.
    pub fn peek_min(&self) -> Option<&Event> {
        self.queue.peek().map(|Reverse(event)| event)
    }

    /// Delivery time of the smallest event, if any.
    pub fn next_time(&self) -> Option<SimTime> {
        self.peek_min().map(|e| e.delivery_time)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Copies of all pending events in dispatch order.
    pub fn to_ordered_vec(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.queue.iter().map(|Reverse(e)| e.clone()).collect();
        events.sort();
        events
    }

    /// Drain all events in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(Reverse(e)) = self.queue.pop() {
            events.push(e);
        }
        events
    }
}

impl FromIterator<Event> for TimeVortex {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        TimeVortex {
            queue: iter.into_iter().map(Reverse).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Destination, Payload};
    use crate::id::{ComponentId, PartitionId};

    fn event(time: u64, priority: i32, sequence: u64, label: &str) -> Event {
        Event {
            payload: Payload::Text(label.into()),
            delivery_time: SimTime::new(time),
            priority,
            sequence,
            origin: PartitionId::new(0, 0),
            destination: Destination::Port {
                component: ComponentId::new(0),
                port: "in".into(),
            },
        }
    }

    fn labels(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .map(|e| match &e.payload {
                Payload::Text(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_time_ordering() {
        let mut vortex = TimeVortex::new();
        vortex.insert(event(30, 0, 0, "late"));
        vortex.insert(event(10, 0, 1, "early"));
        vortex.insert(event(20, 0, 2, "mid"));

        assert_eq!(vortex.pop_min().unwrap().delivery_time, SimTime::new(10));
        assert_eq!(vortex.pop_min().unwrap().delivery_time, SimTime::new(20));
        assert_eq!(vortex.pop_min().unwrap().delivery_time, SimTime::new(30));
    }

    #[test]
    fn test_priority_then_sequence_at_same_time() {
        let mut vortex = TimeVortex::new();
        vortex.insert(event(10, 50, 0, "normal-first"));
        vortex.insert(event(10, 10, 5, "urgent"));
        vortex.insert(event(10, 50, 1, "normal-second"));

        let order = labels(&vortex.drain_ordered());
        assert_eq!(order, vec!["urgent", "normal-first", "normal-second"]);
    }

    #[test]
    fn test_order_independent_of_insertion_order() {
        let events = vec![
            event(5, 1, 0, "a"),
            event(3, 2, 1, "b"),
            event(5, 0, 2, "c"),
            event(1, 9, 3, "d"),
            event(3, 2, 4, "e"),
            event(5, 1, 5, "f"),
        ];

        let forward: TimeVortex = events.iter().cloned().collect();
        let backward: TimeVortex = events.iter().rev().cloned().collect();

        let mut rotated = TimeVortex::new();
        for e in events.iter().skip(3).chain(events.iter().take(3)) {
            rotated.insert(e.clone());
        }

        let expected = vec!["d", "b", "e", "c", "a", "f"];
        assert_eq!(labels(&forward.clone().drain_ordered()), expected);
        assert_eq!(labels(&backward.clone().drain_ordered()), expected);
        assert_eq!(labels(&rotated.drain_ordered()), expected);
    }

    #[test]
    fn test_pop_empty_is_an_error() {
        let mut vortex = TimeVortex::new();
        assert!(vortex.is_empty());
        assert!(vortex.peek_min().is_none());
        assert_eq!(vortex.pop_min(), Err(SimError::EmptyVortex));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut vortex = TimeVortex::new();
        vortex.insert(event(7, 0, 0, "x"));
        assert_eq!(vortex.next_time(), Some(SimTime::new(7)));
        assert_eq!(vortex.len(), 1);
        assert!(vortex.pop_min().is_ok());
        assert!(vortex.is_empty());
    }

    #[test]
    fn test_to_ordered_vec_leaves_queue_intact() {
        let vortex: TimeVortex = vec![event(2, 0, 1, "y"), event(1, 0, 0, "x")]
            .into_iter()
            .collect();
        assert_eq!(labels(&vortex.to_ordered_vec()), vec!["x", "y"]);
        assert_eq!(vortex.len(), 2);
    }
}
