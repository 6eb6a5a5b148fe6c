//! Mount point checks
//!
//! Backups usually land on an external disk. If that disk is not mounted the
//! backup root resolves to a plain directory on the system disk, so a run
//! must refuse to start instead of silently filling it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};

/// Kernel mount table of the current process
#[cfg(unix)]
const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Answers whether a path is the root of a mounted filesystem
pub trait MountChecker {
    fn is_mount_point(&self, path: &Path) -> BackupResult<bool>;
}

/// Checks mount points against the live filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMountChecker;

impl SystemMountChecker {
    pub fn new() -> Self {
        Self
    }
}

impl MountChecker for SystemMountChecker {
    /// A directory is a mount point when it lives on a different device than
    /// its parent, when it is its own parent (the filesystem root), or when
    /// the kernel mount table lists it. Symlinks are followed.
    #[cfg(unix)]
    fn is_mount_point(&self, path: &Path) -> BackupResult<bool> {
        use std::os::unix::fs::MetadataExt;

        let resolved = fs::canonicalize(path).map_err(|e| inspect_error(path, e))?;
        let meta = fs::metadata(&resolved).map_err(|e| inspect_error(&resolved, e))?;
        if !meta.is_dir() {
            return Ok(false);
        }

        let parent = resolved.parent().unwrap_or(&resolved);
        let parent_meta = fs::metadata(parent).map_err(|e| inspect_error(parent, e))?;
        if meta.dev() != parent_meta.dev() || meta.ino() == parent_meta.ino() {
            return Ok(true);
        }

        // Bind mounts keep the device number of their origin
        let listed = match fs::read_to_string(MOUNTINFO) {
            Ok(table) => mount_points(&table).any(|p| p == resolved),
            Err(e) => {
                tracing::debug!(error = %e, "mount table unavailable");
                false
            }
        };
        Ok(listed)
    }

    #[cfg(not(unix))]
    fn is_mount_point(&self, path: &Path) -> BackupResult<bool> {
        let meta = fs::metadata(path).map_err(|e| inspect_error(path, e))?;
        Ok(meta.is_dir() && path.parent().is_none())
    }
}

fn inspect_error(path: &Path, err: std::io::Error) -> BackupError {
    BackupError::Io(format!("Failed to inspect {}: {}", path.display(), err))
}

/// Mount points listed in a mountinfo table, in order
#[cfg(unix)]
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .map(decode_mount_field)
}

/// Undo the `\ooo` octal escaping the kernel applies to spaces and friends
#[cfg(unix)]
fn decode_mount_field(field: &str) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let bytes = field.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    decoded.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(decoded))
}
