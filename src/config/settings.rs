//! Backup settings for backup-rotate
//!
//! Holds the backup root, the source list, the retention count and the mount
//! points that must be present before a run may touch the disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::BackupPaths;
use crate::error::BackupError;

/// Settings for backup runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Settings file format version; newer files are refused
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Directory holding one sub-directory per run
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directories archived on every run, in order
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Number of backup directories kept after pruning
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Paths that must be mount points before a run starts
    #[serde(default)]
    pub required_mounts: Vec<PathBuf>,

    /// Name prefix of run directories
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Run log location; defaults to the log file in the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Per-source archive timeout in seconds (0 disables)
    #[serde(default = "default_archive_timeout_secs")]
    pub archive_timeout_secs: u64,

    /// Exit non-zero when a source was missing or failed to archive
    #[serde(default)]
    pub fail_on_partial: bool,
}

/// Newest settings format this build understands
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_root() -> PathBuf {
    PathBuf::from("/mnt/backup")
}

fn default_max_backups() -> usize {
    5
}

fn default_prefix() -> String {
    "backup".to_string()
}

fn default_archive_timeout_secs() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            root: default_root(),
            sources: Vec::new(),
            max_backups: default_max_backups(),
            required_mounts: Vec::new(),
            prefix: default_prefix(),
            log_file: None,
            archive_timeout_secs: default_archive_timeout_secs(),
            fail_on_partial: false,
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &BackupPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| BackupError::Io(format!("Failed to read settings file: {}", e)))?;

        Ok(serde_json::from_str(&contents)?)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &BackupPaths) -> Result<(), BackupError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| BackupError::Io(format!("Failed to write settings file: {}", e)))
    }

    /// Resolve the run log path
    pub fn log_path(&self, paths: &BackupPaths) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| paths.log_file())
    }

    /// Per-source archive timeout, if any
    pub fn archive_timeout(&self) -> Option<Duration> {
        match self.archive_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Check that the settings describe a run that can be carried out
    ///
    /// Archive names are derived from source basenames, so every source
    /// needs one and no two sources may share it.
    pub fn validate(&self) -> Result<(), BackupError> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(BackupError::Validation(format!(
                "Settings schema version {} is newer than supported version {}",
                self.schema_version, SCHEMA_VERSION
            )));
        }

        if self.root.as_os_str().is_empty() {
            return Err(BackupError::Validation("Backup root must not be empty".into()));
        }

        if self.prefix.is_empty() {
            return Err(BackupError::Validation("Prefix must not be empty".into()));
        }
        if self.prefix.contains(['/', '\\']) || self.prefix == "." || self.prefix == ".." {
            return Err(BackupError::Validation(format!(
                "Prefix must be a plain name: {}",
                self.prefix
            )));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source_basename(source).ok_or_else(|| {
                BackupError::Validation(format!(
                    "Source has no directory name: {}",
                    source.display()
                ))
            })?;
            if !seen.insert(name.clone()) {
                return Err(BackupError::Validation(format!(
                    "Two sources share the name '{}'; archive names would collide",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Final path component of a source, used as archive root and name stem
pub fn source_basename(source: &Path) -> Option<String> {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}
