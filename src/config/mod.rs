//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Scheduler settings (interval, retries, backoff, daemon mode)
//! - The collection command run by the bundled binary

mod app;
mod validation;

pub use app::{AppConfig, CommandConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
