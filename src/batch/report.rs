use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ErrorKind, FillError};

/// How processing of one image ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Every path filled and the mask was written
    Completed,
    /// Mask written, but some paths failed to fill
    PartiallyFailed,
    /// Cancellation observed; any mask written holds partial fills
    Cancelled,
    /// No companion trace file
    Skipped,
    /// Inputs unreadable or the mask could not be written
    Failed,
}

/// One error recorded against a file.
#[derive(Clone, Debug, Serialize)]
pub struct FileIssue {
    pub kind: ErrorKind,
    /// Path the error belongs to, for per-run failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl FileIssue {
    pub fn from_error(err: &FillError) -> Self {
        Self {
            kind: err.kind(),
            path: None,
            message: err.to_string(),
        }
    }

    pub fn for_path(err: &FillError, path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::from_error(err)
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FileReport {
    pub image: PathBuf,
    pub traces: Option<PathBuf>,
    /// Written mask, if any
    pub output: Option<PathBuf>,
    pub status: FileStatus,
    /// Paths found in the trace file
    pub paths: usize,
    /// Runs that produced a result
    pub fills: usize,
    /// True voxels in the merged mask
    pub filled_voxels: usize,
    pub issues: Vec<FileIssue>,
    pub warnings: Vec<String>,
    pub elapsed_secs: f64,
}

impl FileReport {
    pub fn new(image: &Path, traces: Option<&Path>) -> Self {
        Self {
            image: image.to_path_buf(),
            traces: traces.map(Path::to_path_buf),
            output: None,
            status: FileStatus::Completed,
            paths: 0,
            fills: 0,
            filled_voxels: 0,
            issues: Vec::new(),
            warnings: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    /// Record an error that ends processing of this file.
    pub fn fail(&mut self, status: FileStatus, err: &FillError) {
        self.status = status;
        self.issues.push(FileIssue::from_error(err));
    }

    pub fn has_issue(&self, kind: ErrorKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Counts of file outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub partially_failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Parts of the input tree that could not be listed
    pub discovery_issues: Vec<FileIssue>,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn new(input_root: &Path, output_root: &Path) -> Self {
        Self {
            input_root: input_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            discovery_issues: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn summary(&self) -> BatchSummary {
        let mut s = BatchSummary {
            total: self.files.len(),
            ..Default::default()
        };
        for f in &self.files {
            match f.status {
                FileStatus::Completed => s.completed += 1,
                FileStatus::PartiallyFailed => s.partially_failed += 1,
                FileStatus::Cancelled => s.cancelled += 1,
                FileStatus::Skipped => s.skipped += 1,
                FileStatus::Failed => s.failed += 1,
            }
        }
        s
    }

    /// Report for the given image, if it was discovered.
    pub fn file(&self, image: &Path) -> Option<&FileReport> {
        self.files.iter().find(|f| f.image == image)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        std::fs::write(path, json)
            .map_err(|e| format!("Failed to write report {}: {e}", path.display()))
    }
}
