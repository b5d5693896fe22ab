//! Reconnect delay computation.
//!
//! Attempt `n` (from 0) waits `min(max, base * 2^min(n, 10)) * (1 + jitter * U)`
//! with `U` uniform in `[0, 1)`. The exponent is capped so the multiplier
//! stays finite for a broker that is down for hours.

use crate::config::ReconnectPolicy;
use std::time::Duration;

const MAX_EXPONENT: u32 = 10;

impl ReconnectPolicy {
    /// Delay for `attempt` without jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u64 << attempt.min(MAX_EXPONENT);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Delay for `attempt` with random jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, rand::random::<f64>())
    }

    /// Delay for `attempt` given a jitter sample in `[0, 1)`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0) * sample.clamp(0.0, 1.0);
        scale(self.base_delay_for_attempt(attempt), 1.0 + jitter)
    }

    /// Upper bound of any delay this policy produces.
    pub fn max_jittered_delay(&self) -> Duration {
        scale(Duration::from_millis(self.max_delay_ms), 1.0 + self.jitter.clamp(0.0, 1.0))
    }

    /// Whether another attempt is allowed after `failed_attempts` failures.
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| failed_attempts < max)
    }
}

/// Scales at millisecond resolution.
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::from_millis((delay.as_millis() as f64 * factor).round() as u64)
}
