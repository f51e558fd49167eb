use serde::{Deserialize, Serialize};

use crate::error::FillError;

/// Voxel adjacency used when expanding a fill
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Face neighbors only
    Six,
    /// Face and edge neighbors
    Eighteen,
    /// Face, edge and corner neighbors
    #[default]
    TwentySix,
}

impl Connectivity {
    /// Neighbor offsets, excluding the center voxel.
    pub fn offsets(self) -> Vec<[isize; 3]> {
        let mut out = Vec::with_capacity(26);
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let order = dx.abs() + dy.abs() + dz.abs();
                    let keep = match self {
                        Connectivity::Six => order == 1,
                        Connectivity::Eighteen => order == 1 || order == 2,
                        Connectivity::TwentySix => order >= 1,
                    };
                    if keep {
                        out.push([dx, dy, dz]);
                    }
                }
            }
        }
        out
    }
}

/// When a fill stops expanding
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopPolicy {
    /// Stop once the cheapest pending node costs more than the threshold
    Threshold,
    /// Expand until the frontier is empty or `node_budget` nodes are finalized
    Exhaustive { node_budget: Option<usize> },
}

impl Default for StopPolicy {
    fn default() -> Self {
        StopPolicy::Threshold
    }
}

/// Parameters for a single fill run
///
/// Built once and shared by every run on a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Maximum accumulated cost of a filled voxel (default 0.01)
    pub threshold: f64,
    /// Stop policy (default threshold)
    pub stop: StopPolicy,
    /// Keep nodes beyond the threshold for diagnostics (default false)
    pub retain_extra_nodes: bool,
    /// Neighborhood (default 26-connected)
    pub connectivity: Connectivity,
    /// Finalized-node interval between progress callbacks (default 4096)
    pub progress_interval: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            stop: StopPolicy::Threshold,
            retain_extra_nodes: false,
            connectivity: Connectivity::TwentySix,
            progress_interval: 4096,
        }
    }
}

impl FillConfig {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), FillError> {
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(FillError::InvalidConfig(format!(
                "fill threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
