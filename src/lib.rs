//! backup-rotate - timestamped tarball backups with retention
//!
//! Each run checks that required disks are mounted, archives every configured
//! source directory into a fresh `<prefix>_<timestamp>` directory under the
//! backup root, and prunes the oldest run directories beyond the retention
//! count. Everything that happens is written to a timestamped run log.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `backup`: The backup run, its capabilities and retention
//! - `runlog`: The operator-facing run log
//! - `display`: Terminal formatting
//! - `cli`: Command handlers for the binary
//!
//! # Example
//!
//! ```rust,ignore
//! use backup_rotate::config::{paths::BackupPaths, settings::Settings};
//!
//! let paths = BackupPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod runlog;

pub use error::{BackupError, BackupResult};
