//! # Bounded best-first frontier
//!
//! A min-heap of (priority, tiebreak, coordinate) entries. The second key
//! breaks ties with the raw path cost, which keeps pop order deterministic
//! when many entries share an f-value under parallel expansion. An optional
//! size cap turns the queue into a bounded frontier that sheds its worst
//! entry on overflow.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::GridVec;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A frontier entry: `priority` is the heap key (typically f = g + h),
/// `tiebreak` the raw path cost g.
#[derive(Debug, Clone, Copy)]
pub struct PriorityVec {
    pub priority: f32,
    pub tiebreak: f32,
    pub vec: GridVec,
}

/// Min-heap of [`PriorityVec`] with an optional maximum size.
#[derive(Debug, Clone)]
pub struct BoundedHeap {
    heap: BinaryHeap<PriorityVec>,
    limit: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PriorityVec {
    pub fn new(priority: f32, tiebreak: f32, vec: GridVec) -> Self {
        Self {
            priority,
            tiebreak,
            vec,
        }
    }

    fn key(&self) -> (OrderedFloat<f32>, OrderedFloat<f32>) {
        (OrderedFloat(self.priority), OrderedFloat(self.tiebreak))
    }
}

impl PartialEq for PriorityVec {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PriorityVec {}

impl Ord for PriorityVec {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Flipped so that BinaryHeap, a max-heap, pops the minimum key
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for PriorityVec {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl BoundedHeap {
    /// A heap with no size limit.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            limit: 0,
        }
    }

    /// Set the maximum number of entries, 0 meaning unbounded.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Hint at the expected number of entries.
    pub fn reserve(&mut self, capacity: usize) {
        self.heap.reserve(capacity.saturating_sub(self.heap.len()));
    }

    pub fn push(&mut self, entry: PriorityVec) {
        self.heap.push(entry);
        if self.limit > 0 && self.heap.len() > self.limit {
            self.drop_worst();
        }
    }

    pub fn pop(&mut self) -> Option<PriorityVec> {
        self.heap.pop()
    }

    pub fn top(&self) -> Option<&PriorityVec> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Remove the entry with the largest key. Only runs on overflow, so the
    /// linear scan is off the hot path.
    fn drop_worst(&mut self) {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        if let Some((worst, _)) = entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (OrderedFloat(e.priority), OrderedFloat(e.tiebreak)))
            .map(|(i, e)| (i, *e))
        {
            entries.swap_remove(worst);
        }
        self.heap = BinaryHeap::from(entries);
    }
}

impl Default for BoundedHeap {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn entry(p: f32, t: f32) -> PriorityVec {
        PriorityVec::new(p, t, GridVec::new(0, 0, 0))
    }

    #[test]
    fn test_min_order() {
        let mut heap = BoundedHeap::new();
        heap.push(entry(3.0, 0.0));
        heap.push(entry(1.0, 0.0));
        heap.push(entry(2.0, 0.0));

        assert_eq!(heap.pop().unwrap().priority, 1.0);
        assert_eq!(heap.pop().unwrap().priority, 2.0);
        assert_eq!(heap.pop().unwrap().priority, 3.0);
        assert!(heap.pop().is_none());
    }

    #[test]
    fn test_tiebreak() {
        let mut heap = BoundedHeap::new();
        heap.push(entry(1.0, 5.0));
        heap.push(entry(1.0, 2.0));

        assert_eq!(heap.pop().unwrap().tiebreak, 2.0);
        assert_eq!(heap.pop().unwrap().tiebreak, 5.0);
    }

    #[test]
    fn test_limit_drops_worst() {
        let mut heap = BoundedHeap::new();
        heap.set_limit(3);
        for p in [4.0, 2.0, 3.0, 1.0] {
            heap.push(entry(p, 0.0));
        }

        assert_eq!(heap.len(), 3);
        assert_eq!(heap.pop().unwrap().priority, 1.0);
        assert_eq!(heap.pop().unwrap().priority, 2.0);
        assert_eq!(heap.pop().unwrap().priority, 3.0);
    }
}
