//! Fixed-capacity FIFO ring buffer.
//!
//! Backs every bounded series in the crate: the per-sensor rolling window
//! used for live charts and the assembled frame list. Pushing onto a full
//! buffer evicts the oldest entry in O(1).

use std::collections::VecDeque;

use serde::{Serialize, Serializer};

// ---

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    // ---
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    // ---
    /// Create an empty buffer. A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        // ---
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted oldest entry when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        // ---
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Newest to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Positional access, `0` being the oldest retained entry.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_push_within_capacity_keeps_everything() {
        // ---
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        // ---
        let mut ring = RingBuffer::new(20);
        for i in 0..20 {
            ring.push(i);
        }
        assert_eq!(ring.push(20), Some(0));
        assert_eq!(ring.len(), 20);
        assert_eq!(ring.get(0), Some(&1));
        assert_eq!(ring.latest(), Some(&20));
        assert!(!ring.iter().any(|v| *v == 0));
    }

    #[test]
    fn test_newest_first_order() {
        // ---
        let mut ring = RingBuffer::new(2);
        ring.push("a");
        ring.push("b");
        ring.push("c");
        assert_eq!(ring.iter_newest_first().copied().collect::<Vec<_>>(), vec!["c", "b"]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        // ---
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(1);
        assert_eq!(ring.push(2), Some(1));
    }

    #[test]
    fn test_serializes_as_sequence() {
        // ---
        let mut ring = RingBuffer::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(serde_json::to_string(&ring).unwrap(), "[2,3]");
    }
}
