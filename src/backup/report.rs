//! Results of a backup run

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::retention::PruneReport;
use crate::display::format_size;

/// What happened to one source during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Archive written
    Archived,
    /// Source path did not exist
    SourceMissing,
    /// Archiver reported an error
    Failed(String),
}

/// Result of archiving one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    /// The configured source path
    pub source: PathBuf,
    /// Archive location, set when the archive was written
    pub archive: Option<PathBuf>,
    pub outcome: ArchiveOutcome,
}

impl ArchiveResult {
    pub fn archived(source: PathBuf, archive: PathBuf) -> Self {
        Self {
            source,
            archive: Some(archive),
            outcome: ArchiveOutcome::Archived,
        }
    }

    pub fn missing(source: PathBuf) -> Self {
        Self {
            source,
            archive: None,
            outcome: ArchiveOutcome::SourceMissing,
        }
    }

    pub fn failed(source: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            source,
            archive: None,
            outcome: ArchiveOutcome::Failed(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ArchiveOutcome::Archived
    }

    /// Error message for unsuccessful results
    pub fn error_message(&self) -> Option<String> {
        match &self.outcome {
            ArchiveOutcome::Archived => None,
            ArchiveOutcome::SourceMissing => Some("source does not exist".to_string()),
            ArchiveOutcome::Failed(reason) => Some(reason.clone()),
        }
    }
}

/// A completed backup run
#[derive(Debug, Clone)]
pub struct BackupRun {
    /// Run timestamp, second resolution
    pub started_at: NaiveDateTime,
    /// Directory holding this run's archives
    pub directory: PathBuf,
    /// One entry per configured source, in order
    pub results: Vec<ArchiveResult>,
    /// Total size of the run directory after archiving
    pub size_bytes: u64,
    /// Outcome of retention pruning; `None` if the root could not be listed
    pub prune: Option<PruneReport>,
}

impl BackupRun {
    pub fn succeeded(&self) -> impl Iterator<Item = &ArchiveResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn unsuccessful(&self) -> impl Iterator<Item = &ArchiveResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// True if at least one source was missing or failed
    pub fn is_partial(&self) -> bool {
        self.unsuccessful().next().is_some()
    }

    /// Human-readable summary, one line per entry
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Backup directory: {}", self.directory.display()),
            format!("Backup size: {}", format_size(self.size_bytes)),
            format!(
                "Sources: {} archived, {} skipped or failed",
                self.succeeded().count(),
                self.unsuccessful().count()
            ),
        ];

        for result in &self.results {
            match result.error_message() {
                None => lines.push(format!("  OK      {}", result.source.display())),
                Some(msg) => lines.push(format!("  FAILED  {} ({})", result.source.display(), msg)),
            }
        }

        if let Some(prune) = &self.prune {
            lines.push(format!(
                "Retention: {} kept, {} removed, {} could not be removed",
                prune.kept.len(),
                prune.removed.len(),
                prune.failures.len()
            ));
        }

        lines
    }
}

/// Total size of all files below `path`; symlinks are not followed
///
/// Unreadable entries count as zero. A missing path has size zero.
pub fn dir_size(path: &Path) -> u64 {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return 0,
    };

    if !meta.is_dir() {
        return meta.len();
    }

    fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| dir_size(&entry.path()))
                .sum()
        })
        .unwrap_or(0)
}
