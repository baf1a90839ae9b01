//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;

use super::validation::{ConfigError, expand_env_vars};

/// External command executed on each collection cycle.
///
/// A zero exit status is a successful cycle; anything else is a transient
/// failure handled by the scheduler's retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to run.
    pub program: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Kill the command if it runs longer than this.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl CommandConfig {
    /// Create a command configuration.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Set the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set the per-cycle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate that a program is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "command.program must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Collection command run on each cycle.
    #[serde(default)]
    pub command: CommandConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let expanded = expand_env_vars(&raw);
        let config: Self = serde_yaml::from_str(&expanded)?;
        Ok(config)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.command.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
scheduler:
  interval: 10m
  max_executions: 100
  backoff: exponential
  backoff_base: 2s
  backoff_max: 1m
  continue_on_error: true
  daemon: true
  pid_file: /tmp/collector.pid
  log_file: /tmp/collector.log
command:
  program: fetch-readings
  args: ["--source", "stations"]
  timeout: 30s
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.scheduler.interval, Duration::from_secs(600));
        assert_eq!(config.scheduler.max_executions, 100);
        assert!(config.scheduler.daemon);
        assert_eq!(config.command.program, "fetch-readings");
        assert_eq!(config.command.args, vec!["--source", "stations"]);
        assert_eq!(config.command.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_env_expansion_in_config() {
        std::env::set_var("CADENCE_TEST_PROGRAM", "probe");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
scheduler:
  interval: ${{CADENCE_TEST_INTERVAL:-45s}}
command:
  program: ${{CADENCE_TEST_PROGRAM}}
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.interval, Duration::from_secs(45));
        assert_eq!(config.command.program, "probe");
        std::env::remove_var("CADENCE_TEST_PROGRAM");
    }

    #[test]
    fn test_empty_program_rejected() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::load("/nonexistent/cadence.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
