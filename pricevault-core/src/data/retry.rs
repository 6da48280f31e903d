//! Retry policy with capped exponential backoff and jitter.

use rand::Rng;
use std::time::Duration;

/// How many attempts a ticker gets and how long to wait between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter multiplier, e.g. 0.25 for up to +25%.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter_fraction: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, after `failed_attempt` attempts have failed.
    ///
    /// `min(max_delay, base_delay * 2^(n-1)) * (1 + U[0, jitter_fraction])`,
    /// raised to `hint` when the source asked for a longer wait, and never
    /// above `max_delay`.
    pub fn backoff_delay<R: Rng + ?Sized>(
        &self,
        failed_attempt: u32,
        hint: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        let scaled = self
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        let delay = if self.jitter_fraction > 0.0 {
            scaled.mul_f64(1.0 + rng.gen_range(0.0..=self.jitter_fraction))
        } else {
            scaled
        };
        let delay = match hint {
            Some(h) => delay.max(h),
            None => delay,
        };
        delay.min(self.max_delay)
    }
}
