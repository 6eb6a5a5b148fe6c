//! Names of run directories and archives
//!
//! Run directories are `<prefix>_<timestamp>`, archives inside them are
//! `<basename>_<timestamp>.<ext>`. The timestamp is fixed-width and
//! zero-padded, so sorting names sorts runs by time.

use chrono::NaiveDateTime;

/// strftime format embedded in directory and archive names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Length of a formatted timestamp
const TIMESTAMP_LEN: usize = 19;

/// Format a run timestamp for use in names
pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Name of the run directory for `timestamp`
pub fn run_dir_name(prefix: &str, timestamp: &str) -> String {
    format!("{}_{}", prefix, timestamp)
}

/// Name of the archive of `basename` created by the run at `timestamp`
pub fn archive_file_name(basename: &str, timestamp: &str, extension: &str) -> String {
    format!("{}_{}.{}", basename, timestamp, extension)
}

/// Parse the timestamp out of a run directory name
///
/// Returns `None` unless the name is exactly `<prefix>_<timestamp>`.
pub fn parse_run_dir_name(prefix: &str, name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(prefix)?.strip_prefix('_')?;
    if stamp.len() != TIMESTAMP_LEN {
        return None;
    }
    // chrono accepts space padding, so only the canonical spelling counts
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .filter(|parsed| format_timestamp(parsed) == stamp)
}
