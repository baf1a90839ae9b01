//! Scheduling core.
//!
//! Composes the backoff strategies, retrying executor, and execution metrics
//! into the [`Scheduler`] tick loop.
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
//! # async fn example() -> Result<(), cadence::scheduler::SchedulerError> {
//! let config = SchedulerConfig::new(Duration::from_secs(300)).with_max_executions(10);
//! let scheduler = Scheduler::new(config);
//! let task = Arc::new(TaskFn::new("probe", |_token| {
//!     Box::pin(async { Ok(TaskOutcome::Collected) }) as TaskFuture
//! }));
//! scheduler.start(CancellationToken::new(), task).await?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod config;
mod core;
mod executor;
mod metrics;

pub use backoff::{BackoffKind, BackoffStrategy};
pub use config::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_HEALTH_INTERVAL, DEFAULT_RETRY_COUNT,
    DEFAULT_TICK_INTERVAL, SchedulerConfig,
};
pub use self::core::{STOP_GRACE_PERIOD, Scheduler, SchedulerError};
pub use executor::{CommandExecutor, ExecutorError};
pub use metrics::{Metrics, MetricsSnapshot};
