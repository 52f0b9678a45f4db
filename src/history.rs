//! Fixed-capacity history buffers.
//!
//! Every diagnostic history in the hub (usage ledger, routing decisions,
//! consensus outcomes, performance samples) is bounded: once capacity is
//! reached the oldest entry is evicted. Nothing in the hub grows without
//! limit.

use std::collections::VecDeque;

/// A ring buffer that keeps the most recent `capacity` items.
///
/// Not internally synchronised — owners wrap it in their own lock.
#[derive(Debug, Clone)]
pub struct History<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    /// Create an empty history bounded at `capacity` items.
    ///
    /// A capacity of zero is treated as one so a push is never a no-op.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest if the buffer is full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if no items are retained.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest → newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// The most recently pushed item, if any.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> History<T> {
    /// Clone the retained items oldest → newest.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_history_is_empty() {
        let h: History<u32> = History::new(4);
        assert!(h.is_empty());
        assert_eq!(h.len(), 0);
        assert_eq!(h.capacity(), 4);
    }

    #[test]
    fn test_push_below_capacity_keeps_everything() {
        let mut h = History::new(4);
        h.push(1);
        h.push(2);
        assert_eq!(h.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_push_past_capacity_evicts_oldest_first() {
        let mut h = History::new(3);
        for i in 1..=5 {
            h.push(i);
        }
        assert_eq!(h.snapshot(), vec![3, 4, 5]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_latest_returns_most_recent_push() {
        let mut h = History::new(2);
        h.push("a");
        h.push("b");
        h.push("c");
        assert_eq!(h.latest(), Some(&"c"));
    }

    #[test]
    fn test_zero_capacity_is_promoted_to_one() {
        let mut h = History::new(0);
        h.push(7);
        h.push(8);
        assert_eq!(h.snapshot(), vec![8]);
        assert_eq!(h.capacity(), 1);
    }

    #[test]
    fn test_iter_is_oldest_to_newest() {
        let mut h = History::new(10);
        h.push(1);
        h.push(2);
        h.push(3);
        let collected: Vec<_> = h.iter().copied().collect();
        assert_eq!(collected, vec![1, 2, 3]);
    }
}
