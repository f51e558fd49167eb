use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::volume::Voxel;

/// A voxel with its accumulated cost from the nearest seed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub voxel: Voxel,
    pub cost: f64,
}

/// How a fill run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStatus {
    /// Threshold reached or frontier exhausted
    Completed,
    /// Exhaustive run hit its node budget
    BudgetExhausted,
    /// Cancellation observed; nodes are whatever was finalized so far
    Cancelled,
}

/// Outcome of one fill run.
#[derive(Clone, Debug)]
pub struct FillResult {
    /// Path the run was seeded from
    pub path_name: String,
    /// Finalized nodes with cost <= threshold, in finalization order
    pub nodes: Vec<Node>,
    /// Nodes beyond the threshold, kept only when retention is enabled
    pub extra: Vec<Node>,
    pub status: FillStatus,
    pub threshold: f64,
    /// Dimensions of the cost field the run used
    pub dims: (usize, usize, usize),
}

impl FillResult {
    pub(crate) fn empty(path_name: &str, threshold: f64, dims: (usize, usize, usize)) -> Self {
        Self {
            path_name: path_name.to_string(),
            nodes: Vec::new(),
            extra: Vec::new(),
            status: FillStatus::Completed,
            threshold,
            dims,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == FillStatus::Cancelled
    }

    /// Largest accumulated cost among the filled nodes.
    pub fn max_cost(&self) -> Option<f64> {
        self.nodes.iter().map(|n| n.cost).fold(None, |acc, c| match acc {
            Some(m) if m >= c => Some(m),
            _ => Some(c),
        })
    }

    pub fn contains(&self, voxel: Voxel) -> bool {
        self.nodes.iter().any(|n| n.voxel == voxel)
    }
}

/// Cooperative cancellation signal shared between a host and its runs.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
