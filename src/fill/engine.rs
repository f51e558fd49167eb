//! Multi-source cost-weighted fill
//!
//! Every coordinate of a traced path seeds the search at cost 0. Nodes are
//! finalized in non-decreasing order of accumulated cost; the weight of the
//! step u -> v is `(cost(u) + cost(v)) / 2 * |u - v|` with the distance
//! measured in physical units, so anisotropic stacks fill correctly.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use super::config::{FillConfig, StopPolicy};
use super::result::{CancelToken, FillResult, FillStatus, Node};
use crate::cost::CostModel;
use crate::error::FillError;
use crate::priority_queue::Frontier;
use crate::traces::TracePath;
use crate::volume::Voxel;

/// One neighbor step with its precomputed physical length.
#[derive(Clone, Copy, Debug)]
struct Step {
    offset: [isize; 3],
    length: f64,
}

/// Immutable fill runner shared by every path of one volume.
pub struct FillEngine {
    cost: Arc<dyn CostModel>,
    voxel_size: (f64, f64, f64),
    config: FillConfig,
    steps: Vec<Step>,
}

impl FillEngine {
    /// Create an engine over a cost field
    ///
    /// # Arguments
    /// * `cost` - Shared cost model for the volume
    /// * `voxel_size` - Physical voxel sizes (x, y, z)
    /// * `config` - Fill parameters
    pub fn new(
        cost: Arc<dyn CostModel>,
        voxel_size: (f64, f64, f64),
        config: FillConfig,
    ) -> Result<Self, FillError> {
        config.validate()?;
        let (vsx, vsy, vsz) = voxel_size;
        for v in [vsx, vsy, vsz] {
            if !(v.is_finite() && v > 0.0) {
                return Err(FillError::InvalidConfig(format!(
                    "voxel sizes must be positive and finite, got {:?}",
                    voxel_size
                )));
            }
        }

        let steps = config
            .connectivity
            .offsets()
            .into_iter()
            .map(|offset| {
                let dx = offset[0] as f64 * vsx;
                let dy = offset[1] as f64 * vsy;
                let dz = offset[2] as f64 * vsz;
                Step {
                    offset,
                    length: (dx * dx + dy * dy + dz * dz).sqrt(),
                }
            })
            .collect();

        Ok(Self {
            cost,
            voxel_size,
            config,
            steps,
        })
    }

    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    pub fn voxel_size(&self) -> (f64, f64, f64) {
        self.voxel_size
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.cost.dims()
    }

    /// Fill outward from every coordinate of `path`.
    pub fn run(&self, path: &TracePath, cancel: &CancelToken) -> Result<FillResult, FillError> {
        self.run_with_progress(path, cancel, |_, _| {})
    }

    /// Fill with progress callback
    ///
    /// Calls `progress_callback(finalized, frontier_len)` every
    /// `progress_interval` finalized nodes and once when the run ends.
    pub fn run_with_progress<F>(
        &self,
        path: &TracePath,
        cancel: &CancelToken,
        mut progress_callback: F,
    ) -> Result<FillResult, FillError>
    where
        F: FnMut(usize, usize),
    {
        let dims = self.cost.dims();
        let (nx, ny, nz) = dims;
        let threshold = self.config.threshold;
        let threshold_mode = self.config.stop == StopPolicy::Threshold;
        let node_budget = match self.config.stop {
            StopPolicy::Exhaustive { node_budget } => node_budget,
            StopPolicy::Threshold => None,
        };
        let retain = self.config.retain_extra_nodes;
        let interval = self.config.progress_interval.max(1);

        let mut result = FillResult::empty(&path.name, threshold, dims);
        if path.is_empty() {
            progress_callback(0, 0);
            return Ok(result);
        }

        // Resolve seeds before touching any search state
        let mut seeds: Vec<Voxel> = Vec::with_capacity(path.len());
        for (i, &point) in path.points.iter().enumerate() {
            let voxel = seed_voxel(point, dims).ok_or_else(|| FillError::OutOfBounds {
                path: path.name.clone(),
                index: i,
                x: point[0],
                y: point[1],
                z: point[2],
                nx,
                ny,
                nz,
            })?;
            seeds.push(voxel);
        }

        let index = |v: Voxel| v[0] + v[1] * nx + v[2] * nx * ny;

        let mut frontier = Frontier::new();
        let mut best: HashMap<usize, f64> = HashMap::new();
        let mut finalized: HashSet<usize> = HashSet::new();

        for &voxel in &seeds {
            if best.insert(index(voxel), 0.0).is_none() {
                frontier.push(0.0, voxel);
            }
        }

        let mut status = FillStatus::Completed;
        loop {
            if cancel.is_cancelled() {
                status = FillStatus::Cancelled;
                break;
            }
            let Some((g, voxel)) = frontier.pop() else {
                break;
            };

            if threshold_mode && g > threshold {
                // Keep the entry so retained extras include it
                frontier.push(g, voxel);
                break;
            }

            let idx = index(voxel);
            if finalized.contains(&idx) {
                continue;
            }
            if best.get(&idx).map_or(false, |&b| b < g) {
                continue;
            }
            finalized.insert(idx);

            let node = Node { voxel, cost: g };
            if g <= threshold {
                result.nodes.push(node);
            } else if retain {
                result.extra.push(node);
            }

            if finalized.len() % interval == 0 {
                progress_callback(finalized.len(), frontier.len());
            }

            if let Some(budget) = node_budget {
                if finalized.len() >= budget {
                    status = FillStatus::BudgetExhausted;
                    break;
                }
            }

            // Relax neighbors
            let cost_here = self.cost.cost(voxel);
            for step in &self.steps {
                let x = voxel[0] as isize + step.offset[0];
                let y = voxel[1] as isize + step.offset[1];
                let z = voxel[2] as isize + step.offset[2];
                if x < 0 || y < 0 || z < 0 || x >= nx as isize || y >= ny as isize || z >= nz as isize {
                    continue;
                }
                let neighbor = [x as usize, y as usize, z as usize];
                let nidx = index(neighbor);
                if finalized.contains(&nidx) {
                    continue;
                }

                let candidate = g + 0.5 * (cost_here + self.cost.cost(neighbor)) * step.length;
                match best.entry(nidx) {
                    Entry::Occupied(mut e) => {
                        if candidate < *e.get() {
                            e.insert(candidate);
                            frontier.push(candidate, neighbor);
                        }
                    }
                    Entry::Vacant(e) => {
                        e.insert(candidate);
                        frontier.push(candidate, neighbor);
                    }
                }
            }
        }

        if retain && threshold_mode && status == FillStatus::Completed {
            let mut pending: HashSet<usize> = HashSet::new();
            for (g, voxel) in frontier.drain_sorted() {
                let idx = index(voxel);
                if finalized.contains(&idx) || best.get(&idx).map_or(false, |&b| b < g) {
                    continue;
                }
                // Later duplicates of the same voxel are stale by construction
                if pending.insert(idx) {
                    result.extra.push(Node { voxel, cost: g });
                }
            }
        }

        result.status = status;
        progress_callback(finalized.len(), frontier.len());
        debug!(
            "Fill '{}': {} seeds, {} nodes <= {}, {} extra, status {:?}",
            path.name,
            seeds.len(),
            result.nodes.len(),
            threshold,
            result.extra.len(),
            status
        );

        Ok(result)
    }
}

/// Round a sub-voxel coordinate to the voxel that contains it.
fn seed_voxel(point: [f64; 3], dims: (usize, usize, usize)) -> Option<Voxel> {
    let limits = [dims.0, dims.1, dims.2];
    let mut voxel = [0usize; 3];
    for axis in 0..3 {
        let r = point[axis].round();
        if !r.is_finite() || r < 0.0 || r >= limits[axis] as f64 {
            return None;
        }
        voxel[axis] = r as usize;
    }
    Some(voxel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostConfig, CostField};
    use crate::fill::config::Connectivity;
    use crate::volume::{IntensityBounds, Volume, VolumeGeometry};

    /// Constant-cost model for exact distance checks
    struct Uniform {
        dims: (usize, usize, usize),
        cost: f64,
    }

    impl CostModel for Uniform {
        fn dims(&self) -> (usize, usize, usize) {
            self.dims
        }
        fn cost(&self, _voxel: Voxel) -> f64 {
            self.cost
        }
        fn min_cost(&self) -> f64 {
            self.cost
        }
    }

    fn uniform_engine(n: usize, config: FillConfig) -> FillEngine {
        let model = Arc::new(Uniform { dims: (n, n, n), cost: 1.0 });
        FillEngine::new(model, (1.0, 1.0, 1.0), config).unwrap()
    }

    fn seed(p: [f64; 3]) -> TracePath {
        TracePath::new(0, "seed", vec![p])
    }

    #[test]
    fn test_empty_path_is_empty_result() {
        let engine = uniform_engine(5, FillConfig::default());
        let r = engine.run(&TracePath::default(), &CancelToken::new()).unwrap();
        assert!(r.is_empty());
        assert_eq!(r.status, FillStatus::Completed);
    }

    #[test]
    fn test_out_of_bounds_seed() {
        let engine = uniform_engine(5, FillConfig::default());
        for p in [[5.0, 0.0, 0.0], [-0.6, 1.0, 1.0], [f64::NAN, 0.0, 0.0]] {
            let err = engine.run(&seed(p), &CancelToken::new()).unwrap_err();
            assert!(matches!(err, FillError::OutOfBounds { index: 0, .. }), "{:?}", err);
        }
        // Sub-voxel coordinates round into the volume
        assert!(engine.run(&seed([4.4, 0.0, -0.4]), &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_uniform_cost_distances() {
        let engine = uniform_engine(5, FillConfig::with_threshold(1.8));
        let r = engine.run(&seed([2.0, 2.0, 2.0]), &CancelToken::new()).unwrap();
        // Seed, 6 faces (1), 12 edges (sqrt 2) and 8 corners (sqrt 3)
        assert_eq!(r.len(), 27);
        let corner = r.nodes.iter().find(|n| n.voxel == [1, 1, 1]).unwrap();
        assert!((corner.cost - 3f64.sqrt()).abs() < 1e-12);

        let engine = uniform_engine(5, FillConfig::with_threshold(1.5));
        let r = engine.run(&seed([2.0, 2.0, 2.0]), &CancelToken::new()).unwrap();
        assert_eq!(r.len(), 1 + 6 + 12);
    }

    #[test]
    fn test_connectivity_six() {
        let config = FillConfig {
            threshold: 1.0,
            connectivity: Connectivity::Six,
            ..Default::default()
        };
        let engine = uniform_engine(5, config);
        let r = engine.run(&seed([2.0, 2.0, 2.0]), &CancelToken::new()).unwrap();
        assert_eq!(r.len(), 7);
    }

    #[test]
    fn test_anisotropic_spacing() {
        let model = Arc::new(Uniform { dims: (5, 5, 5), cost: 1.0 });
        let engine = FillEngine::new(model, (1.0, 1.0, 3.0), FillConfig::with_threshold(1.0)).unwrap();
        let r = engine.run(&seed([2.0, 2.0, 2.0]), &CancelToken::new()).unwrap();
        // Only the four in-plane face neighbors are within reach
        assert_eq!(r.len(), 5);
        assert!(!r.contains([2, 2, 3]));
    }

    #[test]
    fn test_pop_order_non_decreasing() {
        let geom = VolumeGeometry::isotropic(8, 8, 8);
        let data: Vec<f64> = (0..512).map(|i| ((i * 37) % 101) as f64).collect();
        let vol = Volume::new(geom, data).unwrap();
        let field = Arc::new(CostField::build(&vol, &CostConfig::default()).unwrap());
        let config = FillConfig {
            stop: StopPolicy::Exhaustive { node_budget: None },
            threshold: f64::MAX,
            ..Default::default()
        };
        let engine = FillEngine::new(field, (1.0, 1.0, 1.0), config).unwrap();
        let path = TracePath::new(0, "p", vec![[0.0, 0.0, 0.0], [7.0, 7.0, 7.0]]);
        let r = engine.run(&path, &CancelToken::new()).unwrap();
        assert_eq!(r.len(), 512);
        assert!(r.nodes.windows(2).all(|w| w[0].cost <= w[1].cost));
    }

    #[test]
    fn test_budget_and_extra_nodes() {
        let config = FillConfig {
            threshold: 1.0,
            stop: StopPolicy::Exhaustive { node_budget: Some(40) },
            retain_extra_nodes: true,
            ..Default::default()
        };
        let engine = uniform_engine(6, config);
        let r = engine.run(&seed([0.0, 0.0, 0.0]), &CancelToken::new()).unwrap();
        assert_eq!(r.status, FillStatus::BudgetExhausted);
        assert_eq!(r.len() + r.extra.len(), 40);
        assert!(r.nodes.iter().all(|n| n.cost <= 1.0));
        assert!(r.extra.iter().all(|n| n.cost > 1.0));

        let config = FillConfig {
            threshold: 1.0,
            stop: StopPolicy::Exhaustive { node_budget: None },
            ..Default::default()
        };
        let engine = uniform_engine(6, config);
        let r = engine.run(&seed([0.0, 0.0, 0.0]), &CancelToken::new()).unwrap();
        assert_eq!(r.status, FillStatus::Completed);
        assert!(r.extra.is_empty());
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn test_threshold_mode_retains_frontier() {
        let config = FillConfig {
            threshold: 1.0,
            connectivity: Connectivity::Six,
            retain_extra_nodes: true,
            ..Default::default()
        };
        let engine = uniform_engine(5, config);
        let r = engine.run(&seed([2.0, 2.0, 2.0]), &CancelToken::new()).unwrap();
        assert_eq!(r.len(), 7);
        // Pending shell: distance-2 voxels along axes (6) and in-plane diagonals (12)
        assert_eq!(r.extra.len(), 18);
        assert!(r.extra.iter().all(|n| n.cost > 1.0));
    }

    #[test]
    fn test_cancelled_before_start_is_empty() {
        let engine = uniform_engine(5, FillConfig::with_threshold(10.0));
        let cancel = CancelToken::new();
        cancel.cancel();
        let r = engine.run(&seed([2.0, 2.0, 2.0]), &cancel).unwrap();
        assert_eq!(r.status, FillStatus::Cancelled);
        assert!(r.is_empty());
    }

    #[test]
    fn test_cancel_mid_run_keeps_finalized_nodes() {
        let config = FillConfig {
            threshold: 10.0,
            progress_interval: 5,
            ..Default::default()
        };
        let engine = uniform_engine(5, config);
        let cancel = CancelToken::new();
        let stopper = cancel.clone();
        let r = engine
            .run_with_progress(&seed([2.0, 2.0, 2.0]), &cancel, |done, _| {
                if done >= 10 {
                    stopper.cancel();
                }
            })
            .unwrap();
        assert_eq!(r.status, FillStatus::Cancelled);
        assert_eq!(r.len(), 10);
        assert!(r.len() < 125);
        assert_eq!(r.nodes[0].voxel, [2, 2, 2]);
        assert!(r.nodes.windows(2).all(|w| w[0].cost <= w[1].cost));
    }

    #[test]
    fn test_retained_frontier_not_counted_as_finalized() {
        let config = FillConfig {
            threshold: 1.0,
            connectivity: Connectivity::Six,
            retain_extra_nodes: true,
            ..Default::default()
        };
        let engine = uniform_engine(5, config);
        let mut last = None;
        let r = engine
            .run_with_progress(&seed([2.0, 2.0, 2.0]), &CancelToken::new(), |done, pending| {
                last = Some((done, pending))
            })
            .unwrap();
        assert_eq!(r.extra.len(), 18);
        assert_eq!(last, Some((7, 0)));
    }

    #[test]
    fn test_progress_reports_final_count() {
        let config = FillConfig {
            threshold: 1.0,
            progress_interval: 2,
            ..Default::default()
        };
        let engine = uniform_engine(5, config);
        let mut calls = Vec::new();
        let r = engine
            .run_with_progress(&seed([2.0, 2.0, 2.0]), &CancelToken::new(), |done, pending| {
                calls.push((done, pending))
            })
            .unwrap();
        assert!(calls.len() >= 2);
        assert_eq!(calls.last().unwrap().0, r.len());
    }

    #[test]
    fn test_repeat_runs_identical() {
        let geom = VolumeGeometry::isotropic(6, 6, 6);
        let data: Vec<f64> = (0..216).map(|i| if i % 7 == 0 { 50.0 } else { 20.0 }).collect();
        let vol = Volume::new(geom, data).unwrap();
        let config = CostConfig {
            bounds: Some(IntensityBounds::new(0.0, 50.0)),
            ..Default::default()
        };
        let field = Arc::new(CostField::build(&vol, &config).unwrap());
        let engine = FillEngine::new(field, (1.0, 1.0, 1.0), FillConfig::with_threshold(0.5)).unwrap();
        let path = TracePath::new(0, "p", vec![[3.0, 3.0, 3.0], [1.2, 0.9, 4.0]]);
        let a = engine.run(&path, &CancelToken::new()).unwrap();
        let b = engine.run(&path, &CancelToken::new()).unwrap();
        assert_eq!(a.nodes, b.nodes);
    }

    #[test]
    fn test_invalid_voxel_size() {
        let model = Arc::new(Uniform { dims: (2, 2, 2), cost: 1.0 });
        assert!(FillEngine::new(model, (1.0, 0.0, 1.0), FillConfig::default()).is_err());
    }
}
