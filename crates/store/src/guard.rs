//! Directory guard: decides, exactly once per store construction, whether a
//! path may be used as a database directory.
//!
//! State machine:
//!
//! ```text
//! path absent                       → create directory + marker, proceed
//! directory with marker             → proceed, load existing segments
//! directory without marker          → MissingMarker (foreign directory)
//! path exists, not a directory      → NotADirectory
//! ```
//!
//! The marker is a zero-length sentinel file created once at directory
//! creation time and never removed by normal operation. Its absence in an
//! otherwise-existing directory means "not ours", not "empty database" —
//! this protects against silently treating an unrelated directory as a
//! store and scattering segment files into it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the marker file certifying a directory holds this store's format.
pub const MARKER_FILENAME: &str = ".strata";

/// A path was rejected as a database directory.
#[derive(Debug, Error)]
pub enum GuardError {
    /// An underlying I/O error while creating the directory or marker.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The path exists but is a plain file (or other non-directory).
    #[error("not a database directory (path exists but is not a directory): {0}")]
    NotADirectory(PathBuf),

    /// The directory exists but carries no marker file.
    #[error("not a database directory (missing marker file): {0}")]
    MissingMarker(PathBuf),
}

/// Validates `root` as a database directory, creating it (plus the marker)
/// when it does not exist yet.
pub(crate) fn prepare(root: &Path) -> Result<(), GuardError> {
    if root.exists() {
        if !root.is_dir() {
            return Err(GuardError::NotADirectory(root.to_path_buf()));
        }
        if !root.join(MARKER_FILENAME).exists() {
            return Err(GuardError::MissingMarker(root.to_path_buf()));
        }
        return Ok(());
    }

    fs::create_dir_all(root)?;
    let marker = File::create(root.join(MARKER_FILENAME))?;
    marker.sync_all()?;
    Ok(())
}
