//! Retry delay strategies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Config-facing selector for a backoff strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// No delay between retries.
    None,
    /// Delay grows linearly with the attempt number.
    Linear,
    /// Delay doubles per attempt, capped at a maximum.
    #[default]
    Exponential,
}

/// Retry delay as a function of the (1-indexed) attempt number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Always zero.
    None,
    /// `attempt * base`.
    Linear {
        /// Delay added per attempt.
        base: Duration,
    },
    /// `min(base * 2^(attempt - 1), max)`.
    Exponential {
        /// Delay of the first retry.
        base: Duration,
        /// Upper bound on the computed delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Build a strategy from configuration values.
    pub fn from_config(kind: BackoffKind, base: Duration, max: Duration) -> Self {
        match kind {
            BackoffKind::None => Self::None,
            BackoffKind::Linear => Self::Linear { base },
            BackoffKind::Exponential => Self::Exponential { base, max },
        }
    }

    /// Delay before retry `attempt`. Attempt numbers start at 1; attempt 0 is
    /// the initial execution and never waits.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self {
            Self::None => Duration::ZERO,
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(*max)
            }
        }
    }

    /// Clear strategy-local state after a success.
    ///
    /// All current strategies are pure functions of the attempt number, so this
    /// is a no-op; adaptive strategies would reset their history here.
    pub fn reset(&mut self) {}
}
