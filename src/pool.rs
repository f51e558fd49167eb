//! Bounded worker pool for fill runs
//!
//! Runs are submitted as tasks; each submission returns a `FillHandle` whose
//! `join` blocks until that run has produced its result. Runs share only the
//! engine (and through it the read-only cost field).

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use log::debug;

use crate::error::FillError;
use crate::fill::{CancelToken, FillEngine, FillResult};
use crate::traces::TracePath;

type RunOutcome = Result<FillResult, FillError>;

/// Completion handle of one submitted run.
pub struct FillHandle {
    path_name: String,
    receiver: Receiver<std::thread::Result<RunOutcome>>,
}

impl FillHandle {
    pub fn path_name(&self) -> &str {
        &self.path_name
    }

    /// Wait for the run to finish.
    pub fn join(self) -> RunOutcome {
        match self.receiver.recv() {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(FillError::WorkerLost(format!(
                "fill of '{}' panicked",
                self.path_name
            ))),
            Err(_) => Err(FillError::WorkerLost(format!(
                "worker dropped fill of '{}' before completing",
                self.path_name
            ))),
        }
    }
}

pub struct FillPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl FillPool {
    /// Pool with `workers` threads; 0 picks the number of logical CPUs.
    pub fn new(workers: usize) -> Result<Self, FillError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fill-{}", i))
            .build()
            .map_err(|e| FillError::InvalidConfig(format!("failed to start fill workers: {}", e)))?;
        let workers = pool.current_num_threads();
        debug!("Fill pool started with {} workers", workers);
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue one run.
    pub fn submit(&self, engine: Arc<FillEngine>, path: TracePath, cancel: CancelToken) -> FillHandle {
        let (tx, rx) = bounded(1);
        let path_name = path.name.clone();
        self.pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.run(&path, &cancel)));
            let _ = tx.send(outcome);
        });
        FillHandle {
            path_name,
            receiver: rx,
        }
    }

    /// Run every path and wait for all of them; results keep input order.
    pub fn run_all(
        &self,
        engine: &Arc<FillEngine>,
        paths: &[TracePath],
        cancel: &CancelToken,
    ) -> Vec<RunOutcome> {
        let handles: Vec<FillHandle> = paths
            .iter()
            .map(|p| self.submit(Arc::clone(engine), p.clone(), cancel.clone()))
            .collect();
        handles.into_iter().map(FillHandle::join).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostConfig, CostField};
    use crate::fill::{FillConfig, FillStatus};
    use crate::volume::{Volume, VolumeGeometry};

    fn engine() -> Arc<FillEngine> {
        let geom = VolumeGeometry::isotropic(6, 6, 6);
        let data: Vec<f64> = (0..216).map(|i| (i % 5) as f64).collect();
        let vol = Volume::new(geom, data).unwrap();
        let field = Arc::new(CostField::build(&vol, &CostConfig::default()).unwrap());
        Arc::new(FillEngine::new(field, (1.0, 1.0, 1.0), FillConfig::with_threshold(3.0)).unwrap())
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let engine = engine();
        let paths: Vec<TracePath> = (0..6)
            .map(|i| TracePath::new(i, format!("p{}", i), vec![[i as f64, 1.0, 2.0]]))
            .collect();
        let pool = FillPool::new(3).unwrap();
        assert_eq!(pool.workers(), 3);

        let cancel = CancelToken::new();
        let parallel = pool.run_all(&engine, &paths, &cancel);
        for (path, outcome) in paths.iter().zip(parallel) {
            let sequential = engine.run(path, &cancel).unwrap();
            let parallel = outcome.unwrap();
            assert_eq!(parallel.path_name, path.name);
            assert_eq!(parallel.nodes, sequential.nodes);
        }
    }

    #[test]
    fn test_errors_stay_per_run() {
        let engine = engine();
        let paths = vec![
            TracePath::new(0, "inside", vec![[1.0, 1.0, 1.0]]),
            TracePath::new(1, "outside", vec![[60.0, 1.0, 1.0]]),
        ];
        let pool = FillPool::new(2).unwrap();
        let outcomes = pool.run_all(&engine, &paths, &CancelToken::new());
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(FillError::OutOfBounds { .. })));
    }

    #[test]
    fn test_cancelled_runs_report_status() {
        let engine = engine();
        let cancel = CancelToken::new();
        cancel.cancel();
        let pool = FillPool::new(1).unwrap();
        let handle = pool.submit(engine, TracePath::new(0, "p", vec![[0.0, 0.0, 0.0]]), cancel);
        assert_eq!(handle.path_name(), "p");
        let r = handle.join().unwrap();
        assert_eq!(r.status, FillStatus::Cancelled);
    }
}
