//! Periodic self-diagnostics.
//!
//! The monitor runs on its own tick, independent of the scheduler's, reading
//! the shared [`Metrics`] handle and process vitals. It is purely
//! observational: anomalies are logged, never acted on.

mod process;

pub use process::{alive_task_count, current_rss_bytes};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{Metrics, MetricsSnapshot};

/// Default interval between health checks (1 minute).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Thresholds that trigger health warnings.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Resident memory above this is flagged (default: 512 MiB).
    pub max_rss_bytes: u64,
    /// Live tokio task counts above this are flagged as a leak heuristic
    /// (default: 1000).
    pub max_alive_tasks: usize,
    /// Success rates below this are flagged once enough executions exist
    /// (default: 80%).
    pub min_success_rate: f64,
    /// Executions this many before the low-success-rate check applies
    /// (default: 10).
    pub min_executions_for_rate: u64,
    /// No execution within this window is flagged as staleness
    /// (default: 30 minutes).
    pub staleness: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_rss_bytes: 512 * 1024 * 1024,
            max_alive_tasks: 1000,
            min_success_rate: 80.0,
            min_executions_for_rate: 10,
            staleness: Duration::from_secs(30 * 60),
        }
    }
}

/// Overall verdict of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// No thresholds exceeded.
    Healthy,
    /// One or more warnings raised.
    Degraded,
}

/// Result of one health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall verdict.
    pub state: HealthState,
    /// Human-readable warnings, one per exceeded threshold.
    pub warnings: Vec<String>,
    /// Metrics at check time.
    pub metrics: MetricsSnapshot,
    /// Resident memory at check time, when readable.
    pub rss_bytes: Option<u64>,
    /// Live tokio tasks at check time, when available.
    pub alive_tasks: Option<usize>,
}

/// Periodic, purely observational health checker.
pub struct HealthMonitor {
    interval: Duration,
    thresholds: HealthThresholds,
    metrics: Arc<Metrics>,
    stop: CancellationToken,
}

impl HealthMonitor {
    /// Create a monitor over the given metrics handle.
    pub fn new(interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            interval,
            thresholds: HealthThresholds::default(),
            metrics,
            stop: CancellationToken::new(),
        }
    }

    /// Override the default thresholds.
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Request the monitor loop to end.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Run the check loop until `stop()` is called or the lifetime ends.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick; nothing has run yet.
        ticker.tick().await;

        tracing::debug!(interval = ?self.interval, "Health monitor started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.check();
                    for warning in &report.warnings {
                        tracing::warn!(%warning, "Health check warning");
                    }
                    if report.state == HealthState::Healthy {
                        tracing::debug!(
                            executions = report.metrics.executions,
                            success_rate = report.metrics.success_rate,
                            "Health check passed"
                        );
                    }
                }
            }
        }
        tracing::debug!("Health monitor stopped");
    }

    /// Run one health check and return its report.
    pub fn check(&self) -> HealthReport {
        let metrics = self.metrics.snapshot();
        let rss_bytes = current_rss_bytes();
        let alive_tasks = alive_task_count();
        let mut warnings = Vec::new();

        if let Some(rss) = rss_bytes {
            if rss > self.thresholds.max_rss_bytes {
                warnings.push(format!(
                    "resident memory {} MiB exceeds threshold {} MiB",
                    rss / (1024 * 1024),
                    self.thresholds.max_rss_bytes / (1024 * 1024)
                ));
            }
        }

        if let Some(tasks) = alive_tasks {
            if tasks > self.thresholds.max_alive_tasks {
                warnings.push(format!(
                    "{} live tasks exceeds threshold {} (possible leak)",
                    tasks, self.thresholds.max_alive_tasks
                ));
            }
        }

        if metrics.executions >= self.thresholds.min_executions_for_rate
            && metrics.success_rate < self.thresholds.min_success_rate
        {
            warnings.push(format!(
                "success rate {:.1}% below threshold {:.1}%",
                metrics.success_rate, self.thresholds.min_success_rate
            ));
        }

        if let Some(last) = metrics.last_execution {
            let age = Utc::now().signed_duration_since(last);
            if age.to_std().unwrap_or(Duration::ZERO) > self.thresholds.staleness {
                warnings.push(format!(
                    "no execution recorded for {} minutes",
                    age.num_minutes()
                ));
            }
        }

        let state = if warnings.is_empty() {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };

        HealthReport {
            state,
            warnings,
            metrics,
            rss_bytes,
            alive_tasks,
        }
    }
}
