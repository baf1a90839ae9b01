//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::scheduler::backoff::BackoffKind;

/// Default tick interval (5 minutes).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default retry budget per execution.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default base delay for backoff strategies (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default cap for exponential backoff (60 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Default interval between health checks (1 minute).
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

fn default_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_backoff_base() -> Duration {
    DEFAULT_BACKOFF_BASE
}

fn default_backoff_max() -> Duration {
    DEFAULT_BACKOFF_MAX
}

fn default_health_interval() -> Duration {
    DEFAULT_HEALTH_INTERVAL
}

fn default_continue_on_error() -> bool {
    true
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("cadence.pid")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("cadence.log")
}

/// Immutable configuration for one scheduler instance.
///
/// Zero durations for `max_runtime` mean "unbounded", and a zero
/// `max_executions` means the same; the tick `interval` itself must be
/// positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Time between scheduled executions.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum total runtime; zero means unbounded.
    #[serde(default, with = "humantime_serde")]
    pub max_runtime: Duration,

    /// Maximum execution count; zero means unbounded.
    #[serde(default)]
    pub max_executions: u64,

    /// Retries allowed per execution on top of the initial attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff strategy between retries.
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Base delay fed to the backoff strategy.
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Cap on exponential backoff delays.
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,

    /// Keep ticking after an execution exhausts its retries.
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,

    /// Log and move on when a cycle reports no new data.
    #[serde(default)]
    pub skip_if_no_new_data: bool,

    /// Interval between health monitor checks.
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// Run detached as a background service.
    #[serde(default)]
    pub daemon: bool,

    /// PID file location for daemon mode.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Log file location for daemon mode.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            max_runtime: Duration::ZERO,
            max_executions: 0,
            retry_count: DEFAULT_RETRY_COUNT,
            backoff: BackoffKind::default(),
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            continue_on_error: true,
            skip_if_no_new_data: false,
            health_check_interval: DEFAULT_HEALTH_INTERVAL,
            daemon: false,
            pid_file: default_pid_file(),
            log_file: default_log_file(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with the given tick interval and defaults for
    /// everything else.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Set the maximum total runtime.
    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = max_runtime;
        self
    }

    /// Set the maximum execution count.
    pub fn with_max_executions(mut self, max_executions: u64) -> Self {
        self.max_executions = max_executions;
        self
    }

    /// Set the per-execution retry budget.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set the backoff strategy and its parameters.
    pub fn with_backoff(mut self, kind: BackoffKind, base: Duration, max: Duration) -> Self {
        self.backoff = kind;
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Set the continue-on-error policy.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Treat cycles reporting no new data as skipped.
    pub fn with_skip_if_no_new_data(mut self, skip: bool) -> Self {
        self.skip_if_no_new_data = skip;
        self
    }

    /// Set the health check interval.
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set daemon mode and its file locations.
    pub fn with_daemon(mut self, pid_file: PathBuf, log_file: PathBuf) -> Self {
        self.daemon = true;
        self.pid_file = pid_file;
        self.log_file = log_file;
        self
    }

    /// Validate invariants that must hold before the scheduler starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Validation(
                "scheduler interval must be greater than zero".into(),
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::Validation(
                "health check interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SchedulerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SchedulerConfig::new(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = SchedulerConfig::new(Duration::from_secs(30))
            .with_max_executions(5)
            .with_retry_count(1)
            .with_continue_on_error(false);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.max_executions, 5);
        assert_eq!(config.retry_count, 1);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_yaml_with_humantime_durations() {
        let yaml = r#"
interval: 90s
max_runtime: 1h
max_executions: 10
backoff: linear
backoff_base: 500ms
"#;
        let config: SchedulerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.interval, Duration::from_secs(90));
        assert_eq!(config.max_runtime, Duration::from_secs(3600));
        assert_eq!(config.max_executions, 10);
        assert_eq!(config.backoff, BackoffKind::Linear);
        assert_eq!(config.backoff_base, Duration::from_millis(500));
        // Unspecified fields fall back to defaults.
        assert_eq!(config.retry_count, DEFAULT_RETRY_COUNT);
        assert!(config.continue_on_error);
    }
}
