//! Backup CLI commands
//!
//! Implements the run, list, prune and log commands.

use std::path::PathBuf;

use chrono::Local;
use clap::Args;

use crate::backup::retention::{list_backup_dirs, prune, split_for_retention};
use crate::backup::{dir_size, BackupRunner, SystemMountChecker, TarArchiver};
use crate::config::paths::BackupPaths;
use crate::config::settings::Settings;
use crate::display::{format_backup_list, BackupListEntry};
use crate::error::BackupResult;
use crate::runlog::{FileRunLog, RunLog};

/// Overrides for a single run; unset options keep the configured value
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Backup root directory
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Source directory to archive (repeatable, replaces configured sources)
    #[arg(long = "source", value_name = "DIR")]
    pub sources: Vec<PathBuf>,

    /// Number of backup directories to keep
    #[arg(long, value_name = "N")]
    pub max_backups: Option<usize>,

    /// Path that must be a mount point (repeatable, replaces configured mounts)
    #[arg(long = "require-mount", value_name = "PATH")]
    pub required_mounts: Vec<PathBuf>,

    /// Name prefix of backup directories
    #[arg(long)]
    pub prefix: Option<String>,
}

impl RunArgs {
    /// Apply the overrides to `settings`
    pub fn apply(self, settings: &mut Settings) {
        if let Some(root) = self.root {
            settings.root = root;
        }
        if !self.sources.is_empty() {
            settings.sources = self.sources;
        }
        if let Some(max_backups) = self.max_backups {
            settings.max_backups = max_backups;
        }
        if !self.required_mounts.is_empty() {
            settings.required_mounts = self.required_mounts;
        }
        if let Some(prefix) = self.prefix {
            settings.prefix = prefix;
        }
    }
}

/// How a completed run went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every source was archived
    Completed,
    /// At least one source was missing or failed
    Partial,
}

/// Carry out one backup run
pub fn handle_run(paths: &BackupPaths, settings: &Settings) -> BackupResult<RunStatus> {
    settings.validate()?;

    let log = FileRunLog::new(settings.log_path(paths));
    let archiver = TarArchiver::new().with_timeout(settings.archive_timeout());
    let mounts = SystemMountChecker::new();

    if settings.sources.is_empty() {
        log.record("WARNING: no sources configured");
    }

    let run = BackupRunner::new(settings, &mounts, &archiver, &log).run()?;

    Ok(if run.is_partial() {
        RunStatus::Partial
    } else {
        RunStatus::Completed
    })
}

/// List backup directories under the root
pub fn handle_list(settings: &Settings, verbose: bool) -> BackupResult<()> {
    let dirs = list_backup_dirs(&settings.root, &settings.prefix)?;

    if dirs.is_empty() {
        println!("No backups found in {}.", settings.root.display());
        println!("Create one with: backup-rotate run");
        return Ok(());
    }

    let now = Local::now().naive_local();
    let entries: Vec<BackupListEntry> = dirs
        .into_iter()
        .map(|dir| BackupListEntry {
            size_bytes: dir_size(&dir.path),
            age: now.signed_duration_since(dir.created_at),
            dir,
        })
        .collect();

    println!("Backups in {}", settings.root.display());
    println!();
    println!("{}", format_backup_list(&entries, verbose));

    Ok(())
}

/// Show or apply the retention policy
pub fn handle_prune(paths: &BackupPaths, settings: &Settings, force: bool) -> BackupResult<()> {
    let dirs = list_backup_dirs(&settings.root, &settings.prefix)?;
    let total = dirs.len();
    let (keep, remove) = split_for_retention(dirs, settings.max_backups);

    if remove.is_empty() {
        println!("No backups to prune.");
        println!(
            "Retention policy keeps {} backup(s); you have {}.",
            settings.max_backups, total
        );
        return Ok(());
    }

    println!("Prune Summary");
    println!("=============");
    println!("Retention policy: keep {}", settings.max_backups);
    println!("Current backups:  {}", total);
    println!("To be kept:       {}", keep.len());
    println!("To be deleted:    {}", remove.len());
    for dir in &remove {
        println!("  {}", dir.name);
    }
    println!();

    if !force {
        println!("To delete old backups, run again with --force flag:");
        println!("  backup-rotate prune --force");
        return Ok(());
    }

    let log = FileRunLog::new(settings.log_path(paths));
    let report = prune(&settings.root, &settings.prefix, settings.max_backups)?;
    for path in &report.removed {
        log.record(&format!("Removed old backup {}", path.display()));
    }
    for failure in &report.failures {
        log.record(&format!(
            "WARNING: could not remove old backup {}: {}",
            failure.path.display(),
            failure.reason
        ));
    }
    println!("Deleted {} backup(s).", report.removed.len());

    Ok(())
}

/// Print the most recent run log lines
pub fn handle_log(paths: &BackupPaths, settings: &Settings, lines: usize) -> BackupResult<()> {
    let log = FileRunLog::new(settings.log_path(paths));
    let recent = log.read_recent(lines)?;

    if recent.is_empty() {
        println!("Run log is empty: {}", log.path().display());
        return Ok(());
    }

    for line in recent {
        println!("{}", line);
    }
    Ok(())
}
