//! Retention of backup directories
//!
//! Keeps the newest `max_backups` run directories under the root and deletes
//! the rest. Deletion is best-effort: a directory that cannot be removed is
//! reported and the remaining ones are still processed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{BackupError, BackupResult};

use super::naming::parse_run_dir_name;

/// A run directory found under the backup root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDir {
    /// Directory name
    pub name: String,
    /// Full path to the directory
    pub path: PathBuf,
    /// Timestamp embedded in the name
    pub created_at: NaiveDateTime,
}

/// A directory that could not be removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a pruning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Directories kept, newest first
    pub kept: Vec<PathBuf>,
    /// Directories deleted
    pub removed: Vec<PathBuf>,
    /// Directories that should have been deleted but weren't
    pub failures: Vec<PruneFailure>,
}

/// List run directories under `root`, newest first
///
/// Entries that are not directories or whose name is not
/// `<prefix>_<timestamp>` are ignored. A missing root yields an empty list.
pub fn list_backup_dirs(root: &Path, prefix: &str) -> BackupResult<Vec<BackupDir>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).map_err(|e| {
        BackupError::Io(format!("Failed to read backup root {}: {}", root.display(), e))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(created_at) = parse_run_dir_name(prefix, &name) {
            dirs.push(BackupDir {
                name,
                path: entry.path(),
                created_at,
            });
        }
    }

    // Names are fixed-width timestamps, so name order is time order
    dirs.sort_by(|a, b| b.name.cmp(&a.name));

    Ok(dirs)
}

/// Split newest-first directories into those kept and those to delete
pub fn split_for_retention(
    mut dirs: Vec<BackupDir>,
    max_backups: usize,
) -> (Vec<BackupDir>, Vec<BackupDir>) {
    let remove = dirs.split_off(max_backups.min(dirs.len()));
    (dirs, remove)
}

/// Delete all but the newest `max_backups` run directories under `root`
pub fn prune(root: &Path, prefix: &str, max_backups: usize) -> BackupResult<PruneReport> {
    prune_with(root, prefix, max_backups, |path| fs::remove_dir_all(path))
}

/// Like [`prune`], deleting each directory with `remove`
pub fn prune_with<F>(
    root: &Path,
    prefix: &str,
    max_backups: usize,
    mut remove: F,
) -> BackupResult<PruneReport>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let dirs = list_backup_dirs(root, prefix)?;
    let (keep, to_remove) = split_for_retention(dirs, max_backups);

    let mut report = PruneReport {
        kept: keep.into_iter().map(|d| d.path).collect(),
        ..PruneReport::default()
    };

    for dir in to_remove {
        match remove(&dir.path) {
            Ok(()) => {
                tracing::debug!(path = %dir.path.display(), "removed old backup");
                report.removed.push(dir.path);
            }
            Err(e) => {
                tracing::warn!(
                    path = %dir.path.display(),
                    error = %e,
                    "failed to remove old backup"
                );
                report.failures.push(PruneFailure {
                    path: dir.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
