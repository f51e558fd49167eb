//! Per-file sequencing of a batch
//!
//! Files are processed one after another; the paths of one file run in
//! parallel on the fill pool. A file's failure is written into its report
//! and the batch moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use super::config::BatchConfig;
use super::discover::{discover_pairs, FilePair, SHARED_TRACES};
use super::report::{BatchReport, FileIssue, FileReport, FileStatus};
use crate::aggregate::{masked_intensity, FillAggregator};
use crate::cost::CostField;
use crate::error::FillError;
use crate::fill::{CancelToken, FillEngine};
use crate::mask::BinaryMask;
use crate::nifti_io;
use crate::pool::FillPool;
use crate::traces::{read_traces_file, Tree};
use crate::volume::{Volume, VolumeGeometry};

/// Source of calibrated volumes.
pub trait VolumeReader: Send + Sync {
    fn read_volume(&self, path: &Path) -> Result<Volume, FillError>;
}

/// Source of traced skeletons.
pub trait TraceReader: Send + Sync {
    fn read_tree(&self, path: &Path) -> Result<Tree, FillError>;
}

/// Destination of masks and auxiliary maps.
pub trait MaskSink: Send + Sync {
    fn write_mask(&self, path: &Path, mask: &BinaryMask) -> Result<(), FillError>;

    fn write_map(&self, path: &Path, data: &[f64], geometry: &VolumeGeometry) -> Result<(), FillError>;
}

/// Decodes NIfTI content whatever the file extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct NiftiVolumeReader;

impl VolumeReader for NiftiVolumeReader {
    fn read_volume(&self, path: &Path) -> Result<Volume, FillError> {
        nifti_io::read_volume_file(path).map_err(|e| FillError::input_not_found(path, e))
    }
}

/// Reads SNT `.traces` files.
#[derive(Clone, Copy, Debug, Default)]
pub struct SntTraceReader;

impl TraceReader for SntTraceReader {
    fn read_tree(&self, path: &Path) -> Result<Tree, FillError> {
        read_traces_file(path).map_err(|e| FillError::input_not_found(path, e))
    }
}

/// Writes uint8 masks and float32 maps as NIfTI.
#[derive(Clone, Copy, Debug, Default)]
pub struct NiftiMaskWriter;

impl MaskSink for NiftiMaskWriter {
    fn write_mask(&self, path: &Path, mask: &BinaryMask) -> Result<(), FillError> {
        nifti_io::save_mask_to_file(path, mask).map_err(|e| FillError::persistence(path, e))
    }

    fn write_map(&self, path: &Path, data: &[f64], geometry: &VolumeGeometry) -> Result<(), FillError> {
        nifti_io::save_map_to_file(path, data, geometry).map_err(|e| FillError::persistence(path, e))
    }
}

/// Runs fills over every discovered image.
pub struct BatchDriver {
    config: BatchConfig,
    volumes: Box<dyn VolumeReader>,
    traces: Box<dyn TraceReader>,
    sink: Box<dyn MaskSink>,
    pool: FillPool,
    cancel: CancelToken,
}

impl BatchDriver {
    /// Driver with the NIfTI/SNT readers and the NIfTI writer.
    pub fn new(config: BatchConfig) -> Result<Self, FillError> {
        config.validate()?;
        let pool = FillPool::new(config.workers)?;
        Ok(Self {
            config,
            volumes: Box::new(NiftiVolumeReader),
            traces: Box::new(SntTraceReader),
            sink: Box::new(NiftiMaskWriter),
            pool,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_volume_reader(mut self, reader: impl VolumeReader + 'static) -> Self {
        self.volumes = Box::new(reader);
        self
    }

    pub fn with_trace_reader(mut self, reader: impl TraceReader + 'static) -> Self {
        self.traces = Box::new(reader);
        self
    }

    pub fn with_sink(mut self, sink: impl MaskSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Token that cancels the running and all remaining files.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self) -> Result<BatchReport, FillError> {
        self.run_with_progress(|_, _| {})
    }

    /// Process every discovered image
    ///
    /// Only an unreadable input root is an error; every per-file problem
    /// lands in that file's report.
    ///
    /// # Arguments
    /// * `progress` - Called after each file with (files done, files total)
    pub fn run_with_progress<F>(&self, mut progress: F) -> Result<BatchReport, FillError>
    where
        F: FnMut(usize, usize),
    {
        let root = &self.config.input_root;
        let discovery = discover_pairs(root, &self.config.suffix)
            .map_err(|e| FillError::input_not_found(root, e))?;
        let pairs = discovery.pairs;
        info!(
            "Processing {} images under {} with {} workers",
            pairs.len(),
            root.display(),
            self.pool.workers()
        );

        let mut report = BatchReport::new(root, &self.config.output_root);
        for (path, reason) in discovery.unreadable {
            let err = FillError::input_not_found(&path, reason);
            report
                .discovery_issues
                .push(FileIssue::for_path(&err, &path.display().to_string()));
        }
        let total = pairs.len();
        for (i, pair) in pairs.iter().enumerate() {
            let file = self.process_file(pair);
            match file.status {
                FileStatus::Completed => info!(
                    "[{}/{}] {}: {} voxels from {} paths",
                    i + 1, total, pair.image.display(), file.filled_voxels, file.paths
                ),
                status => warn!(
                    "[{}/{}] {}: {:?} ({} issues)",
                    i + 1, total, pair.image.display(), status, file.issues.len()
                ),
            }
            report.files.push(file);
            progress(i + 1, total);
        }

        let s = report.summary();
        info!(
            "Batch done: {} completed, {} partial, {} skipped, {} failed, {} cancelled",
            s.completed, s.partially_failed, s.skipped, s.failed, s.cancelled
        );
        Ok(report)
    }

    /// Path of an output volume for `pair`, mirroring its place under the input root.
    pub fn output_path(&self, pair: &FilePair, kind: &str) -> PathBuf {
        let rel_dir = pair
            .image
            .parent()
            .and_then(|p| p.strip_prefix(&self.config.input_root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.config.output_root.join(rel_dir).join(format!(
            "{}_{}{}",
            pair.stem(&self.config.suffix),
            kind,
            self.config.output_extension()
        ))
    }

    /// Fill, merge and persist one image.
    pub fn process_file(&self, pair: &FilePair) -> FileReport {
        let start = Instant::now();
        let mut report = FileReport::new(&pair.image, pair.traces.as_deref());
        self.fill_file(pair, &mut report);
        report.elapsed_secs = start.elapsed().as_secs_f64();
        report
    }

    fn fill_file(&self, pair: &FilePair, report: &mut FileReport) {
        let traces_path = match &pair.traces {
            Some(p) => p,
            None => {
                let expected = pair
                    .image
                    .with_file_name(format!("{}.traces", pair.stem(&self.config.suffix)));
                let err = FillError::input_not_found(
                    expected,
                    format!("no companion trace and no {} alongside", SHARED_TRACES),
                );
                warn!("Skipping {}: {}", pair.image.display(), err);
                report.fail(FileStatus::Skipped, &err);
                return;
            }
        };

        if self.cancel.is_cancelled() {
            report.status = FileStatus::Cancelled;
            return;
        }

        let tree = match self.traces.read_tree(traces_path) {
            Ok(tree) => tree,
            Err(e) => return report.fail(FileStatus::Failed, &e),
        };
        let volume = match self.volumes.read_volume(&pair.image) {
            Ok(volume) => volume,
            Err(e) => return report.fail(FileStatus::Failed, &e),
        };
        report.paths = tree.paths.len();

        if let Some(size) = tree.image_size {
            if size != volume.dims() {
                report.warnings.push(format!(
                    "trace file declares image size {:?}, volume is {:?}",
                    size,
                    volume.dims()
                ));
            }
        }
        if tree.paths.is_empty() {
            report.warnings.push("trace file contains no paths".to_string());
        }

        let field = match CostField::build(&volume, &self.config.cost) {
            Ok(field) => field,
            Err(e) => return report.fail(FileStatus::Failed, &e),
        };
        if field.is_degenerate() {
            let b = field.bounds();
            report.warnings.push(format!(
                "degenerate cost field: intensity range [{}, {}], uniform cost used",
                b.min, b.max
            ));
        }

        let engine = match FillEngine::new(
            Arc::new(field),
            volume.geometry().voxel_size(),
            self.config.fill.clone(),
        ) {
            Ok(engine) => Arc::new(engine),
            Err(e) => return report.fail(FileStatus::Failed, &e),
        };

        debug!("Filling {} paths of {}", tree.paths.len(), pair.image.display());
        let outcomes = self.pool.run_all(&engine, &tree.paths, &self.cancel);

        let mut aggregator = FillAggregator::new(volume.geometry().clone());
        if self.config.write_cost_map {
            aggregator = aggregator.with_cost_map();
        }
        let mut cancelled = false;
        for (path, outcome) in tree.paths.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    if result.is_cancelled() {
                        cancelled = true;
                        let err = FillError::Cancelled {
                            path: path.name.clone(),
                            finalized: result.len(),
                        };
                        report.issues.push(FileIssue::for_path(&err, &path.name));
                    }
                    match aggregator.add(&result) {
                        Ok(()) => report.fills += 1,
                        Err(e) => report.issues.push(FileIssue::for_path(&e, &path.name)),
                    }
                }
                Err(e) => {
                    warn!("Fill of '{}' in {} failed: {}", path.name, pair.image.display(), e);
                    report.issues.push(FileIssue::for_path(&e, &path.name));
                }
            }
        }

        let (mask, costs) = aggregator.finish();
        report.filled_voxels = mask.count();

        if cancelled {
            report
                .warnings
                .push("fill cancelled: written mask holds only the nodes finalized before cancellation".to_string());
        }

        let mask_path = self.output_path(pair, "fill_mask");
        if let Err(e) = self.sink.write_mask(&mask_path, &mask) {
            return report.fail(FileStatus::Failed, &e);
        }
        report.output = Some(mask_path);

        if let Some(costs) = costs {
            let path = self.output_path(pair, "fill_cost");
            if let Err(e) = self.sink.write_map(&path, costs.data(), costs.geometry()) {
                report.issues.push(FileIssue::from_error(&e));
            }
        }
        if self.config.write_masked_intensity {
            let path = self.output_path(pair, "fill_image");
            let written = masked_intensity(&volume, &mask)
                .and_then(|data| self.sink.write_map(&path, &data, volume.geometry()));
            if let Err(e) = written {
                report.issues.push(FileIssue::from_error(&e));
            }
        }

        report.status = if cancelled {
            FileStatus::Cancelled
        } else if report.issues.is_empty() {
            FileStatus::Completed
        } else {
            FileStatus::PartiallyFailed
        };
    }
}

/// Discover, fill and persist everything under `config.input_root`.
pub fn run_batch(config: &BatchConfig) -> Result<BatchReport, FillError> {
    BatchDriver::new(config.clone())?.run()
}
