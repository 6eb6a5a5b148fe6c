//! Configuration module for backup-rotate
//!
//! This module provides configuration management including:
//! - Config directory resolution
//! - Settings persistence and validation

pub mod paths;
pub mod settings;

pub use paths::BackupPaths;
pub use settings::Settings;
