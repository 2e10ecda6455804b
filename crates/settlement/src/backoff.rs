//! Jittered exponential backoff for settlement retries.

use std::time::Duration;

use rand::Rng;

use cadence_api::SettlementConfig;

/// Bounded jittered exponential backoff policy.
///
/// Attempts are counted from 1; `next_delay(n)` is the pause after the
/// n-th failed attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt ceiling, first try included.
    pub max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_pct: f64,
}

impl RetryPolicy {
    /// Build a policy, clamping degenerate inputs into usable ranges.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter_pct: f64) -> Self {
        let base_ms = (base_delay.as_millis() as u64).max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_ms,
            max_delay_ms: (max_delay.as_millis() as u64).max(base_ms),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Delay after the `attempt`-th failure (1-based): doubles from the
    /// base, capped, with symmetric jitter.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);

        let spread = (delay as f64 * self.jitter_pct) as i64;
        let jittered = if spread > 0 {
            let delta = rand::rng().random_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }
}

impl From<&SettlementConfig> for RetryPolicy {
    fn from(config: &SettlementConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.base_delay,
            config.max_delay,
            config.jitter_pct,
        )
    }
}
