//! Archiving of source directories
//!
//! `TarArchiver` shells out to `tar -czf`, with the source's parent as
//! working directory so the archive root is the source's own name.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{BackupError, BackupResult};

/// How often a running archiver is polled while a timeout is set
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a killed archiver gets to be reaped
const REAP_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for stderr after tar has exited with an error
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Compresses one directory into one file
pub trait Archiver {
    /// File extension of produced archives, without leading dot
    fn extension(&self) -> &str;

    /// Archive `source` into `destination`
    ///
    /// On error no file is left at `destination`.
    fn archive(&self, source: &Path, destination: &Path) -> BackupResult<()>;
}

/// Archives directories with the system `tar`
#[derive(Debug, Clone)]
pub struct TarArchiver {
    program: OsString,
    timeout: Option<Duration>,
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl TarArchiver {
    pub fn new() -> Self {
        Self {
            program: OsString::from("tar"),
            timeout: None,
        }
    }

    /// Kill the archiver if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different tar executable
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, source: &Path, destination: &Path) -> BackupResult<Command> {
        let name = source.file_name().ok_or_else(|| BackupError::Archive {
            source_path: source.to_path_buf(),
            reason: "source has no directory name".into(),
        })?;
        let parent = match source.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg("-czf")
            .arg(destination)
            .arg("-C")
            .arg(parent)
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // tar forks its compressor; a timeout has to reach that one too
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        Ok(cmd)
    }

    /// Wait for the child, killing it once the timeout has elapsed
    fn wait(&self, child: &mut Child, source: &Path) -> BackupResult<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|e| archive_error(source, e));
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(|e| archive_error(source, e))? {
                return Ok(status);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::warn!(
                    source = %source.display(),
                    ?timeout,
                    "archiver timed out, killing it"
                );
                kill_process_group(child);
                reap(child, REAP_GRACE);
                return Err(BackupError::ArchiveTimeout {
                    source_path: source.to_path_buf(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
        }
    }
}

impl Archiver for TarArchiver {
    fn extension(&self) -> &str {
        "tar.gz"
    }

    fn archive(&self, source: &Path, destination: &Path) -> BackupResult<()> {
        let mut child = self
            .command(source, destination)?
            .spawn()
            .map_err(|e| archive_error(source, e))?;

        // Drain stderr on the side so a chatty tar can't block on a full pipe.
        // The thread is never joined: anything that inherited the pipe keeps it
        // open for as long as it lives.
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut output = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut output);
            }
            let _ = tx.send(output);
        });

        let result = match self.wait(&mut child, source) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                let stderr = rx.recv_timeout(DRAIN_GRACE).unwrap_or_default();
                let detail = stderr.trim();
                Err(BackupError::Archive {
                    source_path: source.to_path_buf(),
                    reason: if detail.is_empty() {
                        format!("tar exited with {}", status)
                    } else {
                        format!("tar exited with {}: {}", status, detail)
                    },
                })
            }
            Err(e) => Err(e),
        };

        if result.is_err() && destination.exists() {
            let _ = fs::remove_file(destination);
        }

        result
    }
}

/// Kill the child and every process in its group
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    // The child leads its own group, so its pid is the group id
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg takes no pointers
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

/// Collect a killed child's status, giving up after `grace`
fn reap(child: &mut Child, grace: Duration) {
    let started = Instant::now();
    while started.elapsed() < grace {
        match child.try_wait() {
            Ok(None) => thread::sleep(Duration::from_millis(10)),
            _ => return,
        }
    }
    tracing::warn!(pid = child.id(), "archiver still running after kill");
}

fn archive_error(source: &Path, err: std::io::Error) -> BackupError {
    BackupError::Archive {
        source_path: source.to_path_buf(),
        reason: err.to_string(),
    }
}
