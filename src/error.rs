//! Custom error types for backup-rotate
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit code for a run aborted because a required mount point is absent
pub const EXIT_MOUNT_MISSING: u8 = 2;

/// Exit code for a completed run with missing or failed sources, when enabled
pub const EXIT_PARTIAL_FAILURE: u8 = 3;

/// The main error type for backup-rotate operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid settings
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required mount point is not mounted. Aborts the run.
    #[error("Required mount point is not mounted: {}", path.display())]
    MountMissing { path: PathBuf },

    /// The run directory for this timestamp already exists
    #[error("Backup directory already exists: {}", path.display())]
    RunDirExists { path: PathBuf },

    /// The archiver reported a failure for one source
    #[error("Failed to archive {}: {reason}", source_path.display())]
    Archive { source_path: PathBuf, reason: String },

    /// The archiver did not finish within the configured timeout
    #[error("Archiving {} timed out after {timeout:?}", source_path.display())]
    ArchiveTimeout {
        source_path: PathBuf,
        timeout: Duration,
    },
}

impl BackupError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MountMissing { .. } => EXIT_MOUNT_MISSING,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup-rotate operations
pub type BackupResult<T> = Result<T, BackupError>;
