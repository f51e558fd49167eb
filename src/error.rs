//! Error taxonomy for fills and batch runs
//!
//! Every failure is scoped: `OutOfBounds` aborts one run, `InputNotFound` and
//! `PersistenceFailure` abort one file, nothing aborts the batch.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    #[error("input not found or unreadable: {path}: {reason}")]
    InputNotFound { path: PathBuf, reason: String },

    #[error("seed {index} of path '{path}' at ({x:.2}, {y:.2}, {z:.2}) lies outside the {nx}x{ny}x{nz} volume")]
    OutOfBounds {
        path: String,
        index: usize,
        x: f64,
        y: f64,
        z: f64,
        nx: usize,
        ny: usize,
        nz: usize,
    },

    #[error("fill of path '{path}' cancelled after {finalized} nodes")]
    Cancelled { path: String, finalized: usize },

    #[error("failed to write {path}: {reason}")]
    PersistenceFailure { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("fill computed on {found:?} cannot merge into a {expected:?} mask")]
    DimensionMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("fill worker exited before reporting: {0}")]
    WorkerLost(String),
}

/// Coarse classification used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputNotFound,
    OutOfBounds,
    Cancelled,
    PersistenceFailure,
    InvalidConfig,
    DimensionMismatch,
    WorkerLost,
}

impl FillError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FillError::InputNotFound { .. } => ErrorKind::InputNotFound,
            FillError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            FillError::Cancelled { .. } => ErrorKind::Cancelled,
            FillError::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
            FillError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            FillError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            FillError::WorkerLost(_) => ErrorKind::WorkerLost,
        }
    }

    pub(crate) fn input_not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FillError::InputNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FillError::PersistenceFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
