//! Unix daemon manager.

use std::os::unix::io::AsRawFd;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use super::{DaemonConfig, DaemonError, DaemonManager, PidFile};

/// Daemon manager backed by sessions, signals, and a PID file.
pub struct UnixDaemon {
    config: DaemonConfig,
    pid: PidFile,
}

impl UnixDaemon {
    /// Create a manager for the given file locations.
    pub fn new(config: DaemonConfig) -> Self {
        let pid = PidFile::new(&config.pid_file);
        Self { config, pid }
    }

    // Point fds 1 and 2 at the log file. The tracing layer writes to its own
    // handle; this catches everything else (child output, panic messages).
    fn redirect_standard_streams(&self) -> Result<(), DaemonError> {
        let log = super::open_log_file(&self.config)?;
        let fd = log.as_raw_fd();
        for target in [nix::libc::STDOUT_FILENO, nix::libc::STDERR_FILENO] {
            nix::unistd::dup2(fd, target).map_err(|e| DaemonError::LogFile {
                path: self.config.log_file.clone(),
                source: e.into(),
            })?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DaemonManager for UnixDaemon {
    async fn start(&self, stop: CancellationToken) -> Result<(), DaemonError> {
        if let Some(pid) = self.pid.probe() {
            if pid != std::process::id() {
                return Err(DaemonError::AlreadyRunning(pid));
            }
        }

        // Detach from the controlling terminal's session. EPERM means this
        // process is already a group leader, which is fine.
        match nix::unistd::setsid() {
            Ok(sid) => tracing::debug!(sid = sid.as_raw(), "Created new session"),
            Err(e) => tracing::debug!(error = %e, "setsid skipped"),
        }

        self.write_pid()?;

        if self.config.redirect_stdio {
            self.redirect_standard_streams()?;
        }

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| DaemonError::Signal(e.to_string()))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| DaemonError::Signal(e.to_string()))?;
        let mut sighup =
            signal(SignalKind::hangup()).map_err(|e| DaemonError::Signal(e.to_string()))?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
                _ = sighup.recv() => tracing::info!("Received SIGHUP"),
                _ = stop.cancelled() => return,
            }
            stop.cancel();
        });

        tracing::info!(
            pid = std::process::id(),
            pid_file = %self.config.pid_file.display(),
            "Daemon started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        self.remove_pid()?;
        tracing::info!("Daemon stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.pid.probe().is_some()
    }

    fn write_pid(&self) -> Result<(), DaemonError> {
        self.pid.write()
    }

    fn remove_pid(&self) -> Result<(), DaemonError> {
        self.pid.remove()
    }

    fn setup_logging(&self) -> Result<std::fs::File, DaemonError> {
        super::open_log_file(&self.config)
    }
}
