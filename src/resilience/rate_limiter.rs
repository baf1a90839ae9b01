//! Token-bucket throttle for outbound call rate.
//!
//! Refill is computed lazily from elapsed time at acquisition, not by a
//! background timer. Waiting callers poll on a coarse fixed interval; the
//! limiter only needs to keep the call rate under an external API ceiling, not
//! provide hard real-time guarantees.

use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Interval between token polls while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Token bucket parameters.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Bucket capacity.
    pub max_tokens: u64,
    /// Tokens added per refill period.
    pub refill_rate: u64,
    /// Length of one refill period.
    pub refill_period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10,
            refill_rate: 1,
            refill_period: Duration::from_secs(1),
        }
    }
}

/// Error returned by [`RateLimiter::wait`].
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The lifetime was cancelled while waiting for a token.
    #[error("rate limit wait cancelled")]
    Cancelled,
}

#[derive(Debug)]
struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

/// Approximate token-bucket rate limiter, safe for concurrent use.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        let tokens = config.max_tokens;
        Self {
            config,
            bucket: Mutex::new(Bucket {
                tokens,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, polling on a coarse interval.
    ///
    /// Returns promptly with [`RateLimitError::Cancelled`] if the lifetime is
    /// cancelled mid-wait.
    pub async fn wait(&self, token: &CancellationToken) -> Result<(), RateLimitError> {
        loop {
            if token.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }
            if self.try_acquire() {
                return Ok(());
            }
            tokio::select! {
                _ = token.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Tokens currently available, after applying any pending refill.
    pub fn available(&self) -> u64 {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed();
        let period = self.config.refill_period;
        if period.is_zero() {
            bucket.tokens = self.config.max_tokens;
            return;
        }
        let periods = (elapsed.as_nanos() / period.as_nanos()) as u32;
        if periods == 0 {
            return;
        }
        bucket.tokens = bucket
            .tokens
            .saturating_add(periods as u64 * self.config.refill_rate)
            .min(self.config.max_tokens);
        bucket.last_refill += period * periods;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64, rate: u64, period: Duration) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_tokens: max,
            refill_rate: rate,
            refill_period: period,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_full_and_drains() {
        let rl = limiter(3, 1, Duration::from_secs(1));
        assert_eq!(rl.available(), 3);
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());
        assert_eq!(rl.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped() {
        let rl = limiter(2, 5, Duration::from_secs(1));
        while rl.try_acquire() {}

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(rl.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_period_adds_nothing() {
        let rl = limiter(5, 1, Duration::from_secs(1));
        while rl.try_acquire() {}

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(rl.available(), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(rl.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_until_refill() {
        let rl = limiter(1, 1, Duration::from_millis(100));
        let token = CancellationToken::new();

        rl.wait(&token).await.unwrap();
        let start = Instant::now();
        rl.wait(&token).await.unwrap();
        // One token needed at one token per 100ms: never longer than a period
        // plus one poll interval.
        assert!(start.elapsed() <= Duration::from_millis(100) + POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_cancellation() {
        let rl = limiter(1, 1, Duration::from_secs(3600));
        let token = CancellationToken::new();
        rl.wait(&token).await.unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let err = rl.wait(&token).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Cancelled));
    }
}
