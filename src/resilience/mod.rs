//! General-purpose resilience primitives.
//!
//! The circuit breaker and rate limiter protect an operation independently of
//! the scheduler's own retry policy: the executor retries transient failures,
//! while these primitives decide whether the underlying call should happen at
//! all. [`ResilientTask`] composes both around any [`CollectionTask`].

mod circuit_breaker;
mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState};
pub use rate_limiter::{RateLimitError, RateLimiter, RateLimiterConfig};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::task::{CollectionTask, TaskError, TaskOutcome};

/// Wraps a task with an optional rate limiter and circuit breaker.
///
/// The limiter is consulted first (one token per cycle), then the breaker
/// decides whether the inner task runs. A skipped call due to an open circuit
/// surfaces as [`TaskError::CircuitOpen`] without invoking the task.
pub struct ResilientTask {
    inner: Arc<dyn CollectionTask>,
    limiter: Option<Arc<RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ResilientTask {
    /// Wrap a task with no protections; add them with the builder methods.
    pub fn new(inner: Arc<dyn CollectionTask>) -> Self {
        Self {
            inner,
            limiter: None,
            breaker: None,
        }
    }

    /// Throttle cycles through the given rate limiter.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Guard cycles with the given circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }
}

#[async_trait::async_trait]
impl CollectionTask for ResilientTask {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, token: &CancellationToken) -> Result<TaskOutcome, TaskError> {
        if let Some(limiter) = &self.limiter {
            limiter
                .wait(token)
                .await
                .map_err(|RateLimitError::Cancelled| TaskError::Cancelled)?;
        }

        match &self.breaker {
            None => self.inner.run(token).await,
            Some(breaker) => {
                let result = breaker.execute(token, || self.inner.run(token)).await;
                match result {
                    Ok(outcome) => Ok(outcome),
                    Err(CircuitError::Open) => Err(TaskError::CircuitOpen),
                    Err(CircuitError::Cancelled) => Err(TaskError::Cancelled),
                    Err(CircuitError::Inner(e)) => Err(e),
                }
            }
        }
    }
}
