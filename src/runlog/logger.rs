//! File-backed run log
//!
//! Appends one timestamped line per message to the log file and echoes it
//! to stdout. Each write is flushed immediately.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::Local;

use crate::error::{BackupError, BackupResult};

use super::{format_line, RunLog};

/// Appends run log lines to a file
pub struct FileRunLog {
    /// Path to the log file
    log_path: PathBuf,
    /// Whether lines are also printed to stdout
    echo: bool,
}

impl FileRunLog {
    /// Create a logger that writes to `log_path` and echoes to stdout
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            echo: true,
        }
    }

    /// Stop echoing lines to stdout
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Append a single line to the log file
    pub fn append(&self, line: &str) -> BackupResult<()> {
        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    BackupError::Io(format!("Failed to create log directory: {}", e))
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| BackupError::Io(format!("Failed to open run log: {}", e)))?;

        writeln!(file, "{}", line)
            .map_err(|e| BackupError::Io(format!("Failed to write run log: {}", e)))?;

        file.flush()
            .map_err(|e| BackupError::Io(format!("Failed to flush run log: {}", e)))?;

        Ok(())
    }

    /// Read the most recent `count` lines, oldest first
    pub fn read_recent(&self, count: usize) -> BackupResult<Vec<String>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| BackupError::Io(format!("Failed to open run log: {}", e)))?;

        let mut lines = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                BackupError::Io(format!("Failed to read run log line {}: {}", line_num + 1, e))
            })?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        let start = lines.len().saturating_sub(count);
        Ok(lines.split_off(start))
    }

    /// Get the path to the log file
    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

impl RunLog for FileRunLog {
    fn record(&self, message: &str) {
        let line = format_line(&Local::now().naive_local(), message);

        if self.echo {
            println!("{}", line);
        }

        if let Err(e) = self.append(&line) {
            tracing::warn!(path = %self.log_path.display(), error = %e, "run log write failed");
        }
    }
}
