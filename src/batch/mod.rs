//! Batch processing of image folders
//!
//! - `config`: operator parameters, loadable from JSON
//! - `discover`: images and their companion `.traces`
//! - `driver`: per-file fill, merge and persistence behind reader/sink traits
//! - `report`: per-file and batch outcome records

pub mod config;
pub mod discover;
pub mod driver;
pub mod report;

pub use config::{load_config, BatchConfig};
pub use discover::{companion_traces, discover_pairs, FilePair};
pub use driver::{
    run_batch, BatchDriver, MaskSink, NiftiMaskWriter, NiftiVolumeReader, SntTraceReader,
    TraceReader, VolumeReader,
};
pub use report::{BatchReport, BatchSummary, FileIssue, FileReport, FileStatus};
