//! Exponential back-off with jitter for sync attempts.
//!
//! Only transient failures are retried. Permission, validation and
//! not-found failures stop the job on the first attempt.

use std::time::Duration;

use ldesk_core::{AppConfig, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.sync_max_retries,
            backoff_base_ms: config.sync_backoff_base_ms,
            backoff_max_ms: config.sync_backoff_max_ms,
        }
    }

    /// `true` if a failure of `kind` on attempt `attempt` (1-based) earns
    /// another attempt.
    #[must_use]
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind.is_transient() && attempt <= self.max_retries
    }

    /// Upper bound of the sleep after failed attempt `attempt`, before
    /// jitter.
    ///
    /// | Attempt | Delay               |
    /// |---------|---------------------|
    /// | 1       | base × 2⁰           |
    /// | 2       | base × 2¹           |
    /// | 3       | base × 2²           |
    ///
    /// capped at `backoff_max_ms`.
    #[must_use]
    pub fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(10);
        self.backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_max_ms)
    }

    /// The capped delay scaled by a random factor in `[0.75, 1.25)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay_ms(attempt);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(delay_ms)
    }
}
