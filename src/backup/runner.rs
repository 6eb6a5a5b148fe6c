//! The backup run
//!
//! One run, in order:
//!
//! 1. every required mount point must be mounted, otherwise abort untouched
//! 2. create the root and a fresh `<prefix>_<timestamp>` directory
//! 3. archive each source on its own; missing or failing sources are recorded
//! 4. prune run directories beyond `max_backups` (best-effort)
//! 5. log a summary
//!
//! Only step 1 and directory creation can fail the run as a whole.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{Local, NaiveDateTime, Timelike};

use crate::config::settings::{source_basename, Settings};
use crate::error::{BackupError, BackupResult};
use crate::runlog::RunLog;

use super::archiver::Archiver;
use super::mount::MountChecker;
use super::naming::{archive_file_name, format_timestamp, run_dir_name};
use super::report::{dir_size, ArchiveResult, BackupRun};
use super::retention::{self, PruneReport};

/// Runs backups for one set of settings
pub struct BackupRunner<'a> {
    settings: &'a Settings,
    mounts: &'a dyn MountChecker,
    archiver: &'a dyn Archiver,
    log: &'a dyn RunLog,
    remove_dir: fn(&Path) -> io::Result<()>,
}

fn remove_dir_all(path: &Path) -> io::Result<()> {
    fs::remove_dir_all(path)
}

impl<'a> BackupRunner<'a> {
    pub fn new(
        settings: &'a Settings,
        mounts: &'a dyn MountChecker,
        archiver: &'a dyn Archiver,
        log: &'a dyn RunLog,
    ) -> Self {
        Self {
            settings,
            mounts,
            archiver,
            log,
            remove_dir: remove_dir_all,
        }
    }

    #[cfg(test)]
    fn with_dir_remover(mut self, remove_dir: fn(&Path) -> io::Result<()>) -> Self {
        self.remove_dir = remove_dir;
        self
    }

    /// Run a backup stamped with the current local time
    pub fn run(&self) -> BackupResult<BackupRun> {
        self.run_at(Local::now().naive_local())
    }

    /// Run a backup stamped with `now`
    pub fn run_at(&self, now: NaiveDateTime) -> BackupResult<BackupRun> {
        self.settings.validate()?;

        let started_at = now.with_nanosecond(0).unwrap_or(now);
        let timestamp = format_timestamp(&started_at);
        let root = &self.settings.root;

        self.log.record("Backup started");

        self.check_mounts()?;

        fs::create_dir_all(root).map_err(|e| {
            self.log
                .record(&format!("ERROR: cannot create backup root {}: {}", root.display(), e));
            BackupError::Io(format!("Failed to create backup root {}: {}", root.display(), e))
        })?;

        let directory = root.join(run_dir_name(&self.settings.prefix, &timestamp));
        if let Err(e) = fs::create_dir(&directory) {
            self.log.record(&format!(
                "ERROR: cannot create backup directory {}: {}",
                directory.display(),
                e
            ));
            return Err(if e.kind() == std::io::ErrorKind::AlreadyExists {
                BackupError::RunDirExists { path: directory }
            } else {
                BackupError::Io(format!(
                    "Failed to create backup directory {}: {}",
                    directory.display(),
                    e
                ))
            });
        }
        self.log
            .record(&format!("Created backup directory {}", directory.display()));

        let results = self
            .settings
            .sources
            .iter()
            .map(|source| self.archive_source(source, &directory, &timestamp))
            .collect();

        let size_bytes = dir_size(&directory);
        let prune = self.prune();

        let run = BackupRun {
            started_at,
            directory,
            results,
            size_bytes,
            prune,
        };

        for line in run.summary_lines() {
            self.log.record(&line);
        }
        self.log.record("Backup finished");

        Ok(run)
    }

    /// Abort unless every required mount point is mounted
    fn check_mounts(&self) -> BackupResult<()> {
        for mount in &self.settings.required_mounts {
            let mounted = match self.mounts.is_mount_point(mount) {
                Ok(mounted) => mounted,
                Err(e) => {
                    tracing::debug!(path = %mount.display(), error = %e, "mount check failed");
                    false
                }
            };

            if !mounted {
                self.log.record(&format!(
                    "ERROR: {} is not mounted, aborting backup",
                    mount.display()
                ));
                return Err(BackupError::MountMissing {
                    path: mount.clone(),
                });
            }
            tracing::debug!(path = %mount.display(), "mount point present");
        }
        Ok(())
    }

    fn archive_source(&self, source: &Path, directory: &Path, timestamp: &str) -> ArchiveResult {
        if !source.exists() {
            self.log.record(&format!(
                "WARNING: source {} does not exist, skipping",
                source.display()
            ));
            return ArchiveResult::missing(source.to_path_buf());
        }

        // validate() guarantees a basename
        let basename = source_basename(source).unwrap_or_default();
        let destination =
            directory.join(archive_file_name(&basename, timestamp, self.archiver.extension()));

        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            "archiving"
        );
        self.log.record(&format!("Archiving {}", source.display()));

        match self.archiver.archive(source, &destination) {
            Ok(()) => {
                self.log.record(&format!(
                    "Archived {} -> {}",
                    source.display(),
                    destination.display()
                ));
                ArchiveResult::archived(source.to_path_buf(), destination)
            }
            Err(e) => {
                self.log.record(&format!("ERROR: {}", e));
                ArchiveResult::failed(source.to_path_buf(), e.to_string())
            }
        }
    }

    /// Apply retention; failures are logged and never fail the run
    fn prune(&self) -> Option<PruneReport> {
        let settings = self.settings;
        let pruned = retention::prune_with(
            &settings.root,
            &settings.prefix,
            settings.max_backups,
            self.remove_dir,
        );
        match pruned {
            Ok(report) => {
                for path in &report.removed {
                    self.log
                        .record(&format!("Removed old backup {}", path.display()));
                }
                for failure in &report.failures {
                    self.log.record(&format!(
                        "WARNING: could not remove old backup {}: {}",
                        failure.path.display(),
                        failure.reason
                    ));
                }
                Some(report)
            }
            Err(e) => {
                self.log
                    .record(&format!("WARNING: retention pruning skipped: {}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runlog::MemoryRunLog;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Reports the configured paths as mounted
    struct FakeMounts(HashSet<PathBuf>);

    impl FakeMounts {
        fn none() -> Self {
            Self(HashSet::new())
        }

        fn of(paths: &[&Path]) -> Self {
            Self(paths.iter().map(|p| p.to_path_buf()).collect())
        }
    }

    impl MountChecker for FakeMounts {
        fn is_mount_point(&self, path: &Path) -> BackupResult<bool> {
            Ok(self.0.contains(path))
        }
    }

    /// Writes a small file per archive; fails for configured basenames
    #[derive(Default)]
    struct FakeArchiver {
        failing: HashSet<String>,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl FakeArchiver {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl Archiver for FakeArchiver {
        fn extension(&self) -> &str {
            "tar.gz"
        }

        fn archive(&self, source: &Path, destination: &Path) -> BackupResult<()> {
            self.calls.borrow_mut().push(source.to_path_buf());
            let name = source.file_name().unwrap().to_string_lossy().into_owned();
            if self.failing.contains(&name) {
                return Err(BackupError::Archive {
                    source_path: source.to_path_buf(),
                    reason: "tar exited with exit status: 2".into(),
                });
            }
            fs::write(destination, format!("archive of {}", name))?;
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        settings: Settings,
    }

    impl Fixture {
        fn new(max_backups: usize) -> Self {
            let temp = TempDir::new().unwrap();
            let settings = Settings {
                root: temp.path().join("backups"),
                max_backups,
                ..Settings::default()
            };
            Self { temp, settings }
        }

        fn source(&mut self, name: &str, exists: bool) -> PathBuf {
            let path = self.temp.path().join("data").join(name);
            if exists {
                fs::create_dir_all(&path).unwrap();
                fs::write(path.join("file.txt"), b"contents").unwrap();
            }
            self.settings.sources.push(path.clone());
            path
        }

        fn existing_runs(&self, count: u32) {
            for day in 1..=count {
                let dir = self
                    .settings
                    .root
                    .join(format!("backup_2024-12-{:02}_03-00-00", day));
                fs::create_dir_all(&dir).unwrap();
            }
        }

        fn run_dirs(&self) -> Vec<String> {
            retention::list_backup_dirs(&self.settings.root, "backup")
                .unwrap()
                .into_iter()
                .map(|d| d.name)
                .collect()
        }
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_missing_source_is_skipped_and_others_archived() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);
        let missing = fx.source("B", false);
        fx.source("C", true);

        let archiver = FakeArchiver::default();
        let log = MemoryRunLog::new();
        let run = BackupRunner::new(&fx.settings, &FakeMounts::none(), &archiver, &log)
            .run_at(at(9, 3))
            .unwrap();

        assert_eq!(fx.run_dirs(), vec!["backup_2025-01-09_03-00-00"]);
        assert_eq!(run.directory, fx.settings.root.join("backup_2025-01-09_03-00-00"));
        assert!(run.directory.join("A_2025-01-09_03-00-00.tar.gz").exists());
        assert!(run.directory.join("C_2025-01-09_03-00-00.tar.gz").exists());
        assert!(!run.directory.join("B_2025-01-09_03-00-00.tar.gz").exists());

        assert_eq!(run.succeeded().count(), 2);
        assert_eq!(run.results[1], ArchiveResult::missing(missing.clone()));
        assert!(run.is_partial());
        assert!(log.contains(&format!("source {} does not exist", missing.display())));
        assert_eq!(archiver.calls.borrow().len(), 2);
        assert!(run.size_bytes > 0);
    }

    #[test]
    fn test_missing_mount_aborts_without_mutation() {
        let mut fx = Fixture::new(1);
        fx.source("A", true);
        fx.existing_runs(3);
        let mount = fx.temp.path().join("external");
        fx.settings.required_mounts = vec![mount.clone()];

        let archiver = FakeArchiver::default();
        let log = MemoryRunLog::new();
        let err = BackupRunner::new(&fx.settings, &FakeMounts::none(), &archiver, &log)
            .run_at(at(9, 3))
            .unwrap_err();

        assert!(matches!(err, BackupError::MountMissing { ref path } if *path == mount));
        assert_eq!(err.exit_code(), 2);
        // No new directory, no archives, no pruning
        assert_eq!(fx.run_dirs().len(), 3);
        assert!(archiver.calls.borrow().is_empty());
        assert!(log.contains("is not mounted"));
    }

    #[test]
    fn test_missing_mount_does_not_create_root() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);
        fx.settings.required_mounts = vec![fx.temp.path().join("external")];

        let log = MemoryRunLog::new();
        let result = BackupRunner::new(
            &fx.settings,
            &FakeMounts::none(),
            &FakeArchiver::default(),
            &log,
        )
        .run_at(at(9, 3));

        assert!(result.is_err());
        assert!(!fx.settings.root.exists());
    }

    #[test]
    fn test_present_mounts_allow_run() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);
        let mount = fx.temp.path().join("external");
        fx.settings.required_mounts = vec![mount.clone()];

        let log = MemoryRunLog::new();
        let mounts = FakeMounts::of(&[mount.as_path()]);
        let run = BackupRunner::new(&fx.settings, &mounts, &FakeArchiver::default(), &log)
            .run_at(at(9, 3))
            .unwrap();

        assert!(!run.is_partial());
    }

    #[test]
    fn test_archive_failure_is_isolated() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);
        fx.source("B", true);
        fx.source("C", true);

        let archiver = FakeArchiver::failing(&["B"]);
        let log = MemoryRunLog::new();
        let run = BackupRunner::new(&fx.settings, &FakeMounts::none(), &archiver, &log)
            .run_at(at(9, 3))
            .unwrap();

        assert!(run.results[0].is_success());
        assert!(!run.results[1].is_success());
        assert!(run.results[2].is_success());
        assert!(run.results[1]
            .error_message()
            .unwrap()
            .contains("exit status: 2"));
        assert_eq!(archiver.calls.borrow().len(), 3);
        assert!(log.contains("ERROR: Failed to archive"));
    }

    #[test]
    fn test_prune_keeps_newest_including_new_run() {
        let fx = Fixture::new(5);
        fx.existing_runs(7);

        let log = MemoryRunLog::new();
        let run = BackupRunner::new(
            &fx.settings,
            &FakeMounts::none(),
            &FakeArchiver::default(),
            &log,
        )
        .run_at(at(9, 3))
        .unwrap();

        let dirs = fx.run_dirs();
        assert_eq!(
            dirs,
            vec![
                "backup_2025-01-09_03-00-00",
                "backup_2024-12-07_03-00-00",
                "backup_2024-12-06_03-00-00",
                "backup_2024-12-05_03-00-00",
                "backup_2024-12-04_03-00-00",
            ]
        );
        let prune = run.prune.unwrap();
        assert_eq!(prune.removed.len(), 3);
        assert!(log.contains("Removed old backup"));
    }

    #[test]
    fn test_prune_runs_after_failures() {
        let mut fx = Fixture::new(2);
        fx.existing_runs(4);
        fx.source("gone", false);
        fx.source("broken", true);

        let log = MemoryRunLog::new();
        BackupRunner::new(
            &fx.settings,
            &FakeMounts::none(),
            &FakeArchiver::failing(&["broken"]),
            &log,
        )
        .run_at(at(9, 3))
        .unwrap();

        assert_eq!(fx.run_dirs().len(), 2);
    }

    #[test]
    fn test_zero_retention_removes_everything() {
        let mut fx = Fixture::new(0);
        fx.source("A", true);
        fx.existing_runs(2);

        let log = MemoryRunLog::new();
        let run = BackupRunner::new(
            &fx.settings,
            &FakeMounts::none(),
            &FakeArchiver::default(),
            &log,
        )
        .run_at(at(9, 3))
        .unwrap();

        assert!(fx.run_dirs().is_empty());
        // Size was measured before pruning
        assert!(run.size_bytes > 0);
    }

    #[test]
    fn test_consecutive_runs_keep_prior_archives() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);
        let archiver = FakeArchiver::default();
        let log = MemoryRunLog::new();
        let mounts = FakeMounts::none();
        let runner = BackupRunner::new(&fx.settings, &mounts, &archiver, &log);

        let first = runner.run_at(at(9, 3)).unwrap();
        let first_archive = first.results[0].archive.clone().unwrap();
        let before = fs::read(&first_archive).unwrap();

        let second = runner.run_at(at(10, 3)).unwrap();

        assert_ne!(first.directory, second.directory);
        assert_eq!(fs::read(&first_archive).unwrap(), before);
        assert_eq!(fx.run_dirs().len(), 2);
    }

    #[test]
    fn test_same_second_collision_is_error() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);
        let log = MemoryRunLog::new();
        let archiver = FakeArchiver::default();
        let mounts = FakeMounts::none();
        let runner = BackupRunner::new(&fx.settings, &mounts, &archiver, &log);

        let first = runner.run_at(at(9, 3)).unwrap();
        let err = runner.run_at(at(9, 3)).unwrap_err();

        assert!(matches!(err, BackupError::RunDirExists { .. }));
        assert!(first.results[0].archive.as_ref().unwrap().exists());
        assert_eq!(archiver.calls.borrow().len(), 1);
    }

    #[test]
    fn test_subsecond_precision_is_dropped() {
        let fx = Fixture::new(5);
        let log = MemoryRunLog::new();
        let now = at(9, 3) + chrono::Duration::milliseconds(750);

        let run = BackupRunner::new(
            &fx.settings,
            &FakeMounts::none(),
            &FakeArchiver::default(),
            &log,
        )
        .run_at(now)
        .unwrap();

        assert_eq!(run.started_at, at(9, 3));
    }

    #[test]
    fn test_invalid_settings_rejected_before_touching_disk() {
        let mut fx = Fixture::new(5);
        fx.settings.sources = vec![PathBuf::from("/a/data"), PathBuf::from("/b/data")];

        let log = MemoryRunLog::new();
        let err = BackupRunner::new(
            &fx.settings,
            &FakeMounts::none(),
            &FakeArchiver::default(),
            &log,
        )
        .run_at(at(9, 3))
        .unwrap_err();

        assert!(matches!(err, BackupError::Validation(_)));
        assert!(!fx.settings.root.exists());
    }

    #[test]
    fn test_summary_is_logged() {
        let mut fx = Fixture::new(5);
        fx.source("A", true);

        let log = MemoryRunLog::new();
        BackupRunner::new(&fx.settings, &FakeMounts::none(), &FakeArchiver::default(), &log)
            .run_at(at(9, 3))
            .unwrap();

        let messages = log.messages();
        assert_eq!(messages.first().map(String::as_str), Some("Backup started"));
        assert_eq!(messages.last().map(String::as_str), Some("Backup finished"));
        assert!(log.contains("Backup size:"));
        assert!(log.contains("Sources: 1 archived, 0 skipped or failed"));
    }

    fn refuse_removal(path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("{} is read-only", path.display()),
        ))
    }

    #[test]
    fn test_prune_failure_is_logged_and_run_succeeds() {
        let mut fx = Fixture::new(2);
        fx.source("A", true);
        fx.existing_runs(3);

        let log = MemoryRunLog::new();
        let mounts = FakeMounts::none();
        let archiver = FakeArchiver::default();
        let run = BackupRunner::new(&fx.settings, &mounts, &archiver, &log)
            .with_dir_remover(refuse_removal)
            .run_at(at(9, 3))
            .unwrap();

        let prune = run.prune.as_ref().unwrap();
        assert!(prune.removed.is_empty());
        assert_eq!(prune.failures.len(), 2);
        assert!(prune.failures[0].reason.contains("read-only"));
        assert_eq!(fx.run_dirs().len(), 4);

        assert!(!run.is_partial());
        assert!(log.contains("WARNING: could not remove old backup"));
        assert!(log.contains("2 could not be removed"));
        assert_eq!(
            log.messages().last().map(String::as_str),
            Some("Backup finished")
        );
    }
}
