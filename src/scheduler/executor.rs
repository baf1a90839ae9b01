//! Retrying executor for a single collection cycle.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::scheduler::backoff::BackoffStrategy;
use crate::task::{CollectionTask, TaskError, TaskOutcome};

/// Errors surfaced by [`CommandExecutor::execute_with_retry`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The lifetime was cancelled before or during the cycle. Distinct from an
    /// operation failure and never retried.
    #[error("execution cancelled")]
    Cancelled,

    /// The protecting circuit breaker refused the call. Fail-fast: retrying
    /// against an open circuit would just burn the backoff budget, so the
    /// cycle ends immediately.
    #[error("circuit open, execution skipped")]
    CircuitOpen,

    /// Every attempt failed; wraps the last underlying error.
    #[error("operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made, including the initial one.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: TaskError,
    },
}

/// Runs one collection cycle with bounded retries and backoff sleeps.
#[derive(Debug)]
pub struct CommandExecutor {
    retry_count: u32,
    backoff: BackoffStrategy,
}

impl CommandExecutor {
    /// Create an executor allowing `retry_count` retries after the initial
    /// attempt.
    pub fn new(retry_count: u32, backoff: BackoffStrategy) -> Self {
        Self {
            retry_count,
            backoff,
        }
    }

    /// Attempt the task up to `retry_count + 1` times.
    ///
    /// Cancellation is checked before each attempt and interrupts any backoff
    /// sleep. On success the backoff strategy is reset; on exhaustion the last
    /// error is returned wrapped with the attempt count.
    pub async fn execute_with_retry(
        &mut self,
        token: &CancellationToken,
        task: &dyn CollectionTask,
    ) -> Result<TaskOutcome, ExecutorError> {
        let mut last_error = None;

        for attempt in 0..=self.retry_count {
            if token.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }

            if attempt > 0 {
                let delay = self.backoff.delay(attempt);
                tracing::warn!(
                    task = %task.name(),
                    attempt,
                    delay = ?delay,
                    "Retrying after backoff"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(ExecutorError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match task.run(token).await {
                Ok(outcome) => {
                    self.backoff.reset();
                    return Ok(outcome);
                }
                Err(TaskError::Cancelled) => return Err(ExecutorError::Cancelled),
                Err(TaskError::CircuitOpen) => return Err(ExecutorError::CircuitOpen),
                Err(e) => {
                    tracing::debug!(task = %task.name(), attempt, error = %e, "Attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(ExecutorError::RetriesExhausted {
            attempts: self.retry_count + 1,
            source: last_error.unwrap_or_else(|| TaskError::Failed("no attempts made".into())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyTask {
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    }

    #[async_trait::async_trait]
    impl CollectionTask for FlakyTask {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _token: &CancellationToken) -> Result<TaskOutcome, TaskError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(TaskOutcome::Collected)
            } else {
                Err(TaskError::Failed(format!("attempt {call} failed")))
            }
        }
    }

    fn executor(retries: u32) -> CommandExecutor {
        CommandExecutor::new(
            retries,
            BackoffStrategy::Linear {
                base: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = FlakyTask {
            calls: calls.clone(),
            succeed_on: 3,
        };

        let outcome = executor(3)
            .execute_with_retry(&CancellationToken::new(), &task)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Collected);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = FlakyTask {
            calls: calls.clone(),
            succeed_on: u32::MAX,
        };

        let err = executor(2)
            .execute_with_retry(&CancellationToken::new(), &task)
            .await
            .unwrap_err();
        match err {
            ExecutorError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = FlakyTask {
            calls: calls.clone(),
            succeed_on: 1,
        };

        let token = CancellationToken::new();
        token.cancel();
        let err = executor(2)
            .execute_with_retry(&token, &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_circuit_open_is_not_retried() {
        struct RefusedTask {
            calls: Arc<AtomicU32>,
        }

        #[async_trait::async_trait]
        impl CollectionTask for RefusedTask {
            fn name(&self) -> &str {
                "refused"
            }

            async fn run(&self, _token: &CancellationToken) -> Result<TaskOutcome, TaskError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(TaskError::CircuitOpen)
            }
        }

        let calls = Arc::new(AtomicU32::new(0));
        let task = RefusedTask {
            calls: calls.clone(),
        };

        let err = executor(3)
            .execute_with_retry(&CancellationToken::new(), &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::CircuitOpen));
        // Fail-fast: no second attempt against an open circuit.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff_sleep() {
        struct FailOnce;

        #[async_trait::async_trait]
        impl CollectionTask for FailOnce {
            fn name(&self) -> &str {
                "fail-once"
            }

            async fn run(&self, _token: &CancellationToken) -> Result<TaskOutcome, TaskError> {
                Err(TaskError::Failed("always".into()))
            }
        }

        let token = CancellationToken::new();
        let mut exec = CommandExecutor::new(
            5,
            BackoffStrategy::Linear {
                base: Duration::from_secs(3600),
            },
        );

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = exec.execute_with_retry(&token, &FailOnce).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
    }
}
