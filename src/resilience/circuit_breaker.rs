//! Circuit breaker guarding a repeatedly-failing operation.
//!
//! The Open→HalfOpen timeout transition is evaluated lazily when state is read,
//! and always under the same exclusive lock as the read itself. Checking the
//! state and upgrading it in separate lock acquisitions would let two callers
//! interleave the check and the transition.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Tripped; calls fail fast until the open timeout elapses.
    Open,
    /// Probing; limited calls pass through to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit.
    pub failure_threshold: u32,
    /// Consecutive successes in half-open required to close it.
    pub success_threshold: u32,
    /// Time the circuit stays open before allowing a probe call.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the half-open success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the open-state timeout.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit open")]
    Open,
    /// The lifetime was cancelled before the operation ran.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation ran and failed; the failure was recorded.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

/// Trip/half-open/reset state machine around a protected call.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker in the closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// In the open state this becomes true once the open timeout has elapsed
    /// since the last failure, transitioning the breaker to half-open.
    pub fn ready(&self) -> bool {
        let mut inner = self.lock();
        self.advance_open_timeout(&mut inner);
        matches!(inner.state, CircuitState::Closed | CircuitState::HalfOpen)
    }

    /// Current state, applying the lazy Open→HalfOpen transition first.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.advance_open_timeout(&mut inner);
        inner.state
    }

    /// Record the outcome of a protected call.
    pub fn record_result(&self, success: bool) {
        let mut inner = self.lock();
        if success {
            inner.consecutive_failures = 0;
            inner.consecutive_successes += 1;
            if inner.state == CircuitState::HalfOpen
                && inner.consecutive_successes >= self.config.success_threshold
            {
                tracing::info!("Circuit closed after successful probes");
                inner.state = CircuitState::Closed;
                inner.consecutive_successes = 0;
            }
        } else {
            inner.consecutive_successes = 0;
            inner.consecutive_failures += 1;
            inner.last_failure = Some(Instant::now());
            // A single failure while half-open re-opens the circuit.
            if inner.state == CircuitState::HalfOpen
                || inner.consecutive_failures >= self.config.failure_threshold
            {
                if inner.state != CircuitState::Open {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                }
                inner.state = CircuitState::Open;
            }
        }
    }

    /// Run `f` through the breaker: fail fast if not ready, otherwise invoke it
    /// and feed the result back into the state machine.
    pub async fn execute<F, Fut, T, E>(
        &self,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if token.is_cancelled() {
            return Err(CircuitError::Cancelled);
        }
        if !self.ready() {
            return Err(CircuitError::Open);
        }

        match f().await {
            Ok(value) => {
                self.record_result(true);
                Ok(value)
            }
            Err(e) => {
                self.record_result(false);
                Err(CircuitError::Inner(e))
            }
        }
    }

    fn advance_open_timeout(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure
                .map(|at| at.elapsed() >= self.config.open_timeout)
                .unwrap_or(true);
            if elapsed {
                tracing::debug!("Circuit half-open, allowing probe calls");
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_open_timeout(Duration::from_secs(1)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let cb = breaker();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_result(false);
        cb.record_result(false);
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_result(false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_result(false);
        }
        assert!(!cb.ready());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.ready());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_after_success_threshold() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_result(false);
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_result(true);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_result(true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_while_half_open_reopens() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_result(false);
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_result(false);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count_while_closed() {
        let cb = breaker();
        cb.record_result(false);
        cb.record_result(false);
        cb.record_result(true);
        cb.record_result(false);
        cb.record_result(false);
        // Two failures since the success: still below the threshold.
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_fails_fast_when_open() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_result(false);
        }

        let token = CancellationToken::new();
        let result: Result<(), CircuitError<std::io::Error>> =
            cb.execute(&token, || async { Ok(()) }).await;
        assert!(matches!(result, Err(CircuitError::Open)));
    }

    #[tokio::test]
    async fn test_execute_records_outcomes() {
        let cb = breaker();
        let token = CancellationToken::new();

        let result: Result<u32, CircuitError<std::io::Error>> =
            cb.execute(&token, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        for _ in 0..3 {
            let result: Result<u32, CircuitError<std::io::Error>> = cb
                .execute(&token, || async {
                    Err(std::io::Error::other("backend down"))
                })
                .await;
            assert!(matches!(result, Err(CircuitError::Inner(_))));
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
