//! Background-process lifecycle.
//!
//! The scheduler and CLI depend only on the [`DaemonManager`] capability set;
//! one concrete implementation exists per platform family and is selected at
//! startup by [`platform`]. Daemonization is expressed as "run in a fresh
//! session/process group with standard streams redirected", not as a literal
//! fork.

mod pid;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use pid::{PidFile, process_alive};

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from daemon setup and teardown. All are fatal to startup.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A live process already holds the PID file.
    #[error("another instance is already running (pid {0})")]
    AlreadyRunning(u32),

    /// PID file could not be written, read, or removed.
    #[error("pid file {path}: {source}")]
    PidFile {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// PID file exists but does not contain a decimal PID.
    #[error("invalid pid file contents: {0}")]
    InvalidPid(String),

    /// Log file could not be opened for appending.
    #[error("log file {path}: {source}")]
    LogFile {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// OS signal handler installation failed.
    #[error("failed to install signal handlers: {0}")]
    Signal(String),
}

/// File locations owned by the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Where the decimal PID is recorded.
    pub pid_file: PathBuf,
    /// Append-only log stream for daemon mode.
    pub log_file: PathBuf,
    /// Point the process's stdout/stderr file descriptors at the log file on
    /// start, so child-command output and panic messages land there too.
    /// Disable when a supervising host manages the streams itself. Unix only;
    /// on Windows the tracing layer is the sole writer.
    pub redirect_stdio: bool,
}

/// Platform-specific daemon capabilities.
///
/// `start` must be idempotent-safe against a stale PID file: only a live
/// recorded PID blocks startup.
#[async_trait::async_trait]
pub trait DaemonManager: Send + Sync {
    /// Detach into daemon context, write the PID file, and wire shutdown
    /// signals to cancel `stop`.
    async fn start(&self, stop: CancellationToken) -> Result<(), DaemonError>;

    /// Tear the daemon context down (removes the PID file).
    async fn stop(&self) -> Result<(), DaemonError>;

    /// Whether the PID file records a live process.
    fn is_running(&self) -> bool;

    /// Write the current PID to the PID file.
    fn write_pid(&self) -> Result<(), DaemonError>;

    /// Remove the PID file; missing files are fine.
    fn remove_pid(&self) -> Result<(), DaemonError>;

    /// Open the log file in append mode for stream redirection.
    fn setup_logging(&self) -> Result<std::fs::File, DaemonError>;
}

/// Select the daemon manager for the current platform.
#[cfg(unix)]
pub fn platform(config: DaemonConfig) -> Arc<dyn DaemonManager> {
    Arc::new(unix::UnixDaemon::new(config))
}

/// Select the daemon manager for the current platform.
#[cfg(windows)]
pub fn platform(config: DaemonConfig) -> Arc<dyn DaemonManager> {
    Arc::new(windows::WindowsDaemon::new(config))
}

pub(crate) fn open_log_file(config: &DaemonConfig) -> Result<std::fs::File, DaemonError> {
    if let Some(parent) = config.log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| DaemonError::LogFile {
                path: config.log_file.clone(),
                source,
            })?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .map_err(|source| DaemonError::LogFile {
            path: config.log_file.clone(),
            source,
        })
}
