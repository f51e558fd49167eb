//! Neurite-Fill: cost-weighted volume fills seeded from traced neurites
//!
//! Grows a region outward from every traced centerline of a fluorescence
//! stack, bounded by accumulated intensity-derived cost, and merges the
//! regions into a binary mask that keeps the source calibration.
//!
//! # Modules
//! - `volume`: calibrated intensity volumes and their geometry
//! - `cost`: intensity-to-cost models and the per-volume cost field
//! - `priority_queue`: min-ordered frontier with deterministic ties
//! - `fill`: the shortest-path fill engine, its config and results
//! - `pool`: bounded worker pool running fills in parallel
//! - `mask` / `aggregate`: binary masks, cost maps and fill merging
//! - `traces`: SNT `.traces` reader
//! - `nifti_io`: NIfTI volume input and mask output
//! - `batch`: folder discovery, per-file sequencing and reports

// Core modules
pub mod error;
pub mod volume;
pub mod priority_queue;

// Algorithm modules
pub mod cost;
pub mod fill;
pub mod pool;
pub mod mask;
pub mod aggregate;

// I/O modules
pub mod nifti_io;
pub mod traces;

// Batch orchestration
pub mod batch;

pub use error::FillError;
