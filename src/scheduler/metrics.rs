//! Execution history counters.
//!
//! One [`Metrics`] handle is created per scheduler instance and shared with the
//! health monitor, so every update happens under a lock rather than as a
//! read-then-write sequence.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Default, Clone)]
struct Counters {
    executions: u64,
    failures: u64,
    last_execution: Option<DateTime<Utc>>,
    total_runtime: Duration,
}

/// Thread-safe execution counters.
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<Counters>,
}

/// Point-in-time view of [`Metrics`], with derived values precomputed.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total executions recorded.
    pub executions: u64,
    /// Failed executions (always ≤ `executions`).
    pub failures: u64,
    /// Percentage of successful executions; 0 when nothing has run yet.
    pub success_rate: f64,
    /// Wall-clock time of the most recent execution.
    pub last_execution: Option<DateTime<Utc>>,
    /// Sum of per-execution durations.
    #[serde(with = "humantime_serde")]
    pub total_runtime: Duration,
    /// `total_runtime / executions`; zero when nothing has run yet.
    #[serde(with = "humantime_serde")]
    pub average_runtime: Duration,
}

impl Metrics {
    /// Create a zeroed metrics handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one completed execution.
    pub fn record(&self, duration: Duration, success: bool) {
        let mut inner = self.lock();
        inner.executions += 1;
        if !success {
            inner.failures += 1;
        }
        inner.last_execution = Some(Utc::now());
        inner.total_runtime += duration;
    }

    /// Reset all counters to their initial state.
    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }

    /// Take a consistent snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock().clone();
        let success_rate = if inner.executions == 0 {
            0.0
        } else {
            (inner.executions - inner.failures) as f64 / inner.executions as f64 * 100.0
        };
        let average_runtime = if inner.executions == 0 {
            Duration::ZERO
        } else {
            inner.total_runtime / inner.executions as u32
        };

        MetricsSnapshot {
            executions: inner.executions,
            failures: inner.failures,
            success_rate,
            last_execution: inner.last_execution,
            total_runtime: inner.total_runtime,
            average_runtime,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // A poisoned lock still holds valid counters.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics_snapshot() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.executions, 0);
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.success_rate, 0.0);
        assert_eq!(snap.average_runtime, Duration::ZERO);
        assert!(snap.last_execution.is_none());
    }

    #[test]
    fn test_success_rate_derivation() {
        let metrics = Metrics::new();
        for _ in 0..3 {
            metrics.record(Duration::from_millis(10), true);
        }
        metrics.record(Duration::from_millis(10), false);

        let snap = metrics.snapshot();
        assert_eq!(snap.executions, 4);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.success_rate, 75.0);
        assert!(snap.failures <= snap.executions);
        assert!(snap.last_execution.is_some());
    }

    #[test]
    fn test_average_runtime() {
        let metrics = Metrics::new();
        metrics.record(Duration::from_millis(100), true);
        metrics.record(Duration::from_millis(300), true);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_runtime, Duration::from_millis(400));
        assert_eq!(snap.average_runtime, Duration::from_millis(200));
    }

    #[test]
    fn test_reset_clears_history() {
        let metrics = Metrics::new();
        metrics.record(Duration::from_millis(10), false);
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.executions, 0);
        assert_eq!(snap.failures, 0);
        assert!(snap.last_execution.is_none());
    }

    #[test]
    fn test_all_failures_rate_is_zero() {
        let metrics = Metrics::new();
        for _ in 0..5 {
            metrics.record(Duration::from_millis(1), false);
        }
        assert_eq!(metrics.snapshot().success_rate, 0.0);
    }
}
