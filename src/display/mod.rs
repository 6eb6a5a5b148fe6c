//! Display formatting for terminal output

use crate::backup::retention::BackupDir;

/// A backup directory with its measured size, for listings
#[derive(Debug, Clone)]
pub struct BackupListEntry {
    pub dir: BackupDir,
    pub size_bytes: u64,
    pub age: chrono::Duration,
}

/// Format backup directories as a table, newest first
pub fn format_backup_list(entries: &[BackupListEntry], verbose: bool) -> String {
    if entries.is_empty() {
        return "No backups found.".to_string();
    }

    let name_width = entries
        .iter()
        .map(|e| e.dir.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<4}  {:<name_width$}  {:>8}  {:>10}\n",
        "#",
        "Name",
        "Age",
        "Size",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<4}  {:-<name_width$}  {:->8}  {:->10}\n",
        "",
        "",
        "",
        "",
        name_width = name_width,
    ));

    for (i, entry) in entries.iter().enumerate() {
        output.push_str(&format!(
            "{:<4}  {:<name_width$}  {:>8}  {:>10}\n",
            i + 1,
            entry.dir.name,
            format_duration(entry.age),
            format_size(entry.size_bytes),
            name_width = name_width,
        ));
        if verbose {
            output.push_str(&format!("      {}\n", entry.dir.path.display()));
        }
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    output.push_str(&format!(
        "\nTotal: {} backup(s), {}",
        entries.len(),
        format_size(total)
    ));

    output
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a byte count in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
