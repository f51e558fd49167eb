//! Locating images and their companion traces
//!
//! Directories are walked depth-first with entries sorted by name, so the
//! same tree always yields the same order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Fallback companion shared by every image in a directory.
pub const SHARED_TRACES: &str = "SNT_Data.traces";

/// An image and the trace file that seeds its fills.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePair {
    pub image: PathBuf,
    /// `None` when neither companion exists
    pub traces: Option<PathBuf>,
}

impl FilePair {
    /// File name with the image suffix removed.
    pub fn stem(&self, suffix: &str) -> String {
        let name = self
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.strip_suffix(suffix) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }
}

/// Companion trace of an image
///
/// `<stem>.traces` next to the image wins over the directory's shared
/// `SNT_Data.traces`.
pub fn companion_traces(image: &Path, suffix: &str) -> Option<PathBuf> {
    let dir = image.parent()?;
    let name = image.file_name()?.to_string_lossy().into_owned();
    let stem = name.strip_suffix(suffix).unwrap_or(&name);

    let own = dir.join(format!("{}.traces", stem));
    if own.is_file() {
        return Some(own);
    }
    let shared = dir.join(SHARED_TRACES);
    if shared.is_file() {
        return Some(shared);
    }
    None
}

/// Result of walking an input tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Discovery {
    pub pairs: Vec<FilePair>,
    /// Directories or entries below the root that could not be read
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Find every file under `root` whose name ends with `suffix`
///
/// Only an unreadable root is an error. Subdirectories that cannot be listed
/// are recorded in `Discovery::unreadable` and the walk continues. Symlinked
/// directories are not followed.
pub fn discover_pairs(root: &Path, suffix: &str) -> Result<Discovery, String> {
    let entries = list_dir(root)?;
    let mut images = Vec::new();
    let mut unreadable = Vec::new();
    walk_entries(entries, suffix, &mut images, &mut unreadable);
    debug!("Discovered {} images under {}", images.len(), root.display());

    let pairs = images
        .into_iter()
        .map(|image| {
            let traces = companion_traces(&image, suffix);
            FilePair { image, traces }
        })
        .collect();
    Ok(Discovery { pairs, unreadable })
}

type Listing = Vec<(PathBuf, io::Result<fs::FileType>)>;

fn list_dir(dir: &Path) -> Result<Listing, String> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| format!("Failed to list directory '{}': {}", dir.display(), e))?
    {
        match entry {
            Ok(entry) => entries.push((entry.path(), entry.file_type())),
            Err(e) => {
                return Err(format!("Failed to read entry in '{}': {}", dir.display(), e));
            }
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn walk_dir(dir: &Path, suffix: &str, out: &mut Vec<PathBuf>, unreadable: &mut Vec<(PathBuf, String)>) {
    match list_dir(dir) {
        Ok(entries) => walk_entries(entries, suffix, out, unreadable),
        Err(e) => {
            warn!("Skipping directory: {}", e);
            unreadable.push((dir.to_path_buf(), e));
        }
    }
}

fn walk_entries(
    entries: Listing,
    suffix: &str,
    out: &mut Vec<PathBuf>,
    unreadable: &mut Vec<(PathBuf, String)>,
) {
    for (path, file_type) in entries {
        let file_type = match file_type {
            Ok(t) => t,
            Err(e) => {
                let msg = format!("Failed to stat '{}': {}", path.display(), e);
                warn!("Skipping entry: {}", msg);
                unreadable.push((path, msg));
                continue;
            }
        };
        if file_type.is_dir() {
            walk_dir(&path, suffix, out, unreadable);
            continue;
        }
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(suffix))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        // Symlinked files count, symlinked directories are never entered
        if file_type.is_symlink() && path.is_dir() {
            debug!("Not following directory link {}", path.display());
            continue;
        }
        out.push(path);
    }
}
