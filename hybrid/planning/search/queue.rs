use std::{cmp::Ordering, collections::BinaryHeap};

use ordered_float::OrderedFloat;

struct Entry<T> {
    key: OrderedFloat<f64>,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-priority queue; equal keys pop in insertion order.
pub struct NodeQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for NodeQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> NodeQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item` with heuristic `key`.
    pub fn push(&mut self, key: f64, item: T) {
        self.heap.push(Entry {
            key: OrderedFloat(key),
            seq: self.next_seq,
            item,
        });
        self.next_seq += 1;
    }

    /// Removes the lowest-key item.
    pub fn pop(&mut self) -> Option<(f64, T)> {
        self.heap.pop().map(|entry| (entry.key.into_inner(), entry.item))
    }

    /// Lowest key currently queued.
    #[must_use]
    pub fn peek_key(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.key.into_inner())
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_lowest_heuristic_first() {
        let mut queue = NodeQueue::new();
        for (key, name) in [(5.0, "a"), (1.0, "b"), (3.0, "c")] {
            queue.push(key, name);
        }
        let order: Vec<f64> = std::iter::from_fn(|| queue.pop().map(|(key, _)| key)).collect();
        assert_eq!(order, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut queue = NodeQueue::new();
        queue.push(2.0, "first");
        queue.push(1.0, "low");
        queue.push(2.0, "second");
        queue.push(2.0, "third");
        assert_eq!(queue.peek_key(), Some(1.0));
        let names: Vec<&str> = std::iter::from_fn(|| queue.pop().map(|(_, name)| name)).collect();
        assert_eq!(names, vec!["low", "first", "second", "third"]);
        assert!(queue.is_empty());
    }
}
