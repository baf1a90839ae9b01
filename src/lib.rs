//! Cadence - scheduling and resilience core for data collectors.
//!
//! Given an arbitrary collection operation, cadence repeatedly invokes it on a
//! timer, tolerates transient failures through retry/backoff, can fail fast
//! via circuit breaking, throttles call rate, monitors its own health, and can
//! run unattended as a background service with signal-driven graceful
//! shutdown.
//!
//! # Architecture
//!
//! - **Scheduler**: tick loop, lifecycle, and failure policy
//! - **Resilience**: circuit breaker and token-bucket rate limiter
//! - **Health**: periodic observational self-diagnostics
//! - **Daemon**: PID file, log redirection, and signal/service integration
//!
//! The core never decides *what* to collect or *how* to persist it; the
//! embedding layer supplies a [`task::CollectionTask`] and the core drives it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cadence::scheduler::{Scheduler, SchedulerConfig};
//! use cadence::task::{TaskFn, TaskFuture, TaskOutcome};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cadence::scheduler::SchedulerError> {
//!     let config = SchedulerConfig::new(Duration::from_secs(300));
//!     let scheduler = Scheduler::new(config);
//!     let task = Arc::new(TaskFn::new("fetch", |_token| {
//!         Box::pin(async {
//!             // collect data from somewhere
//!             Ok(TaskOutcome::Collected)
//!         }) as TaskFuture
//!     }));
//!     scheduler.start(CancellationToken::new(), task).await
//! }
//! ```

pub mod config;
pub mod daemon;
pub mod health;
pub mod resilience;
pub mod scheduler;
pub mod task;

pub use config::{AppConfig, ConfigError};
pub use daemon::{DaemonConfig, DaemonError, DaemonManager, PidFile};
pub use health::{HealthMonitor, HealthReport, HealthState};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig, ResilientTask};
pub use scheduler::{Metrics, MetricsSnapshot, Scheduler, SchedulerConfig, SchedulerError};
pub use task::{CollectionTask, TaskError, TaskOutcome};
