//! Backup runs for backup-rotate
//!
//! Creates timestamped backup directories with one compressed archive per
//! source and keeps only the newest ones.
//!
//! # Architecture
//!
//! - `BackupRunner`: carries out one run (mount checks, archiving, pruning)
//! - `MountChecker` / `Archiver`: capabilities the runner depends on, with
//!   `SystemMountChecker` and `TarArchiver` as the production implementations
//! - `retention`: listing and pruning of run directories
//! - `naming`: the directory and archive naming scheme
//!
//! # Layout on Disk
//!
//! ```text
//! <root>/
//!   backup_2025-01-09_03-00-00/
//!     etc_2025-01-09_03-00-00.tar.gz
//!     Music_2025-01-09_03-00-00.tar.gz
//!   backup_2025-01-08_03-00-00/
//!     ...
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use backup_rotate::backup::{BackupRunner, SystemMountChecker, TarArchiver};
//! use backup_rotate::runlog::FileRunLog;
//!
//! let log = FileRunLog::new(settings.log_path(&paths));
//! let archiver = TarArchiver::new().with_timeout(settings.archive_timeout());
//! let runner = BackupRunner::new(&settings, &SystemMountChecker, &archiver, &log);
//! let run = runner.run()?;
//! ```

mod archiver;
mod mount;
pub mod naming;
mod report;
pub mod retention;
mod runner;

pub use archiver::{Archiver, TarArchiver};
pub use mount::{MountChecker, SystemMountChecker};
pub use report::{dir_size, ArchiveOutcome, ArchiveResult, BackupRun};
pub use retention::{list_backup_dirs, prune, BackupDir, PruneFailure, PruneReport};
pub use runner::BackupRunner;
