//! Min-priority frontier for cost-ordered region growing
//!
//! Entries are keyed by `(accumulated cost, voxel)` so that equal costs pop
//! in lexical voxel order. The frontier never decreases keys in place: a
//! better path simply pushes a new entry and the caller skips stale ones.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::volume::Voxel;

#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<Reverse<(OrderedFloat<f64>, Voxel)>>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cost: f64, voxel: Voxel) {
        self.heap.push(Reverse((OrderedFloat(cost), voxel)));
    }

    /// Remove the entry with the smallest cost (lexically smallest voxel on ties).
    pub fn pop(&mut self) -> Option<(f64, Voxel)> {
        self.heap
            .pop()
            .map(|Reverse((OrderedFloat(cost), voxel))| (cost, voxel))
    }

    pub fn peek_cost(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse((OrderedFloat(cost), _))| *cost)
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Empty the frontier in pop order.
    pub fn drain_sorted(&mut self) -> Vec<(f64, Voxel)> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }
}
