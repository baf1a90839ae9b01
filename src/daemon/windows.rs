//! Windows daemon manager.
//!
//! Windows has no signal model; the service host and the console both deliver
//! control events (ctrl-c, break, close, shutdown). All of them map onto the
//! same stop path, so a process managed by the service manager and one run
//! from a console behave identically.

use tokio::signal::windows;
use tokio_util::sync::CancellationToken;

use super::{DaemonConfig, DaemonError, DaemonManager, PidFile};

/// Daemon manager backed by console-control events and a PID file.
pub struct WindowsDaemon {
    config: DaemonConfig,
    pid: PidFile,
}

impl WindowsDaemon {
    /// Create a manager for the given file locations.
    pub fn new(config: DaemonConfig) -> Self {
        let pid = PidFile::new(&config.pid_file);
        Self { config, pid }
    }
}

#[async_trait::async_trait]
impl DaemonManager for WindowsDaemon {
    async fn start(&self, stop: CancellationToken) -> Result<(), DaemonError> {
        if let Some(pid) = self.pid.probe() {
            if pid != std::process::id() {
                return Err(DaemonError::AlreadyRunning(pid));
            }
        }

        self.write_pid()?;

        let mut ctrl_c = windows::ctrl_c().map_err(|e| DaemonError::Signal(e.to_string()))?;
        let mut ctrl_break =
            windows::ctrl_break().map_err(|e| DaemonError::Signal(e.to_string()))?;
        let mut ctrl_close =
            windows::ctrl_close().map_err(|e| DaemonError::Signal(e.to_string()))?;
        let mut ctrl_shutdown =
            windows::ctrl_shutdown().map_err(|e| DaemonError::Signal(e.to_string()))?;

        tokio::spawn(async move {
            tokio::select! {
                _ = ctrl_c.recv() => tracing::info!("Received ctrl-c"),
                _ = ctrl_break.recv() => tracing::info!("Received ctrl-break"),
                _ = ctrl_close.recv() => tracing::info!("Received close event"),
                _ = ctrl_shutdown.recv() => tracing::info!("Received shutdown event"),
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
