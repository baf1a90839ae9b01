//! The collection-operation seam.
//!
//! The scheduler drives an arbitrary [`CollectionTask`] supplied by the embedding
//! layer; the core never inspects what the task actually collects. Tasks receive
//! the shared lifetime token and are expected to observe it at their own
//! suspension points.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result of one successful collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The cycle produced data.
    Collected,
    /// The cycle ran but the source had nothing new. Counts as a success;
    /// relevant when `skip_if_no_new_data` is enabled.
    NoNewData,
}

/// Errors a collection task can surface to the executor.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task observed lifetime cancellation. Never retried.
    #[error("task cancelled")]
    Cancelled,

    /// The protecting circuit breaker was open; the underlying operation
    /// was not invoked.
    #[error("circuit open, operation skipped")]
    CircuitOpen,

    /// Transient operational failure. Retried per backoff policy.
    #[error("{0}")]
    Failed(String),
}

/// A cancellable collection operation driven by the scheduler.
#[async_trait::async_trait]
pub trait CollectionTask: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Perform one collection cycle.
    async fn run(&self, token: &CancellationToken) -> Result<TaskOutcome, TaskError>;
}

/// Boxed future returned by [`TaskFn`] closures.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<TaskOutcome, TaskError>> + Send>>;

/// Adapter turning a closure into a [`CollectionTask`].
///
/// Mainly useful for tests and small embeddings that do not want a dedicated
/// task type.
pub struct TaskFn<F> {
    name: String,
    f: F,
}

impl<F> TaskFn<F>
where
    F: Fn(CancellationToken) -> TaskFuture + Send + Sync,
{
    /// Wrap a closure as a named task.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait::async_trait]
impl<F> CollectionTask for TaskFn<F>
where
    F: Fn(CancellationToken) -> TaskFuture + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, token: &CancellationToken) -> Result<TaskOutcome, TaskError> {
        (self.f)(token.clone()).await
    }
}
