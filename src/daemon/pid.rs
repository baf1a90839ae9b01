//! PID file handling.
//!
//! The PID file plus a liveness probe of the recorded PID is the sole durable
//! "is running" record. A stale file from an unclean shutdown is
//! indistinguishable from a live process unless the probe fails too.

use std::path::{Path, PathBuf};

use super::DaemonError;

/// A process-wide PID file.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a handle for the given path; nothing is written yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current process ID as decimal text. Idempotent: repeated
    /// calls overwrite with the same content.
    pub fn write(&self) -> Result<(), DaemonError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| DaemonError::PidFile {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.path, format!("{}\n", std::process::id())).map_err(|source| {
            DaemonError::PidFile {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Remove the file. Idempotent: a missing file is not an error.
    pub fn remove(&self) -> Result<(), DaemonError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DaemonError::PidFile {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Read the recorded PID, if the file exists and parses.
    pub fn read(&self) -> Result<Option<u32>, DaemonError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DaemonError::PidFile {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let pid = contents
            .trim()
            .parse::<u32>()
            .map_err(|e| DaemonError::InvalidPid(format!("{}: {e}", self.path.display())))?;
        Ok(Some(pid))
    }

    /// The recorded PID, when the file exists and the process is alive.
    ///
    /// Absence of the file, unparseable contents, or a failed liveness probe
    /// all mean "not running".
    pub fn probe(&self) -> Option<u32> {
        match self.read() {
            Ok(Some(pid)) if process_alive(pid) => Some(pid),
            _ => None,
        }
    }
}

/// Probe a process for liveness without affecting it.
///
/// On Unix this sends signal 0. Other platforms have no equivalent in the
/// stack, so a recorded PID is trusted there.
pub fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            // The process exists but belongs to another user.
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}
