//! Run log for backup-rotate
//!
//! The operator-facing account of every run: what was archived, what was
//! skipped, what was pruned. Each message becomes one timestamped line:
//!
//! ```text
//! [2025-03-01 03:00:00] Created backup directory /mnt/backup/backup_2025-03-01_03-00-00
//! ```
//!
//! The sink is injected into the runner as a `RunLog` trait object so tests
//! can assert on the exact messages via `MemoryRunLog`.

mod logger;

use std::sync::Mutex;

use chrono::NaiveDateTime;

pub use logger::FileRunLog;

/// strftime format of the line timestamp
pub const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A sink for run log messages
pub trait RunLog {
    /// Record one message. Write failures never reach the caller.
    fn record(&self, message: &str);
}

/// Format a message as a log line (without trailing newline)
pub fn format_line(at: &NaiveDateTime, message: &str) -> String {
    format!("[{}] {}", at.format(LINE_TIMESTAMP_FORMAT), message)
}

/// Collects messages in memory
#[derive(Debug, Default)]
pub struct MemoryRunLog {
    messages: Mutex<Vec<String>>,
}

impl MemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Check whether any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl RunLog for MemoryRunLog {
    fn record(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
