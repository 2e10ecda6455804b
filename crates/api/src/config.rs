//! Engine configuration.
//!
//! Plain structs passed at construction. There is no global or ambient
//! configuration state anywhere in the engine; a component that needs a
//! knob receives it from whoever built it.

use std::time::Duration;

use crate::constants::*;

/// Metering loop parameters.
#[derive(Debug, Clone)]
pub struct MeteringConfig {
    /// Wall-clock period of one metering tick (one credit per tick).
    pub tick_period: Duration,
    /// Timeout on channel peer calls made from session paths.
    pub channel_call_timeout: Duration,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            channel_call_timeout: DEFAULT_CHANNEL_CALL_TIMEOUT,
        }
    }
}

/// Settlement retry parameters (phase 2 of the close sequence).
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Attempt ceiling for transient failures, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential delay.
    pub max_delay: Duration,
    /// Jitter fraction applied to each delay, `0.0..=1.0`.
    pub jitter_pct: f64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SETTLE_MAX_ATTEMPTS,
            base_delay: DEFAULT_SETTLE_BASE_DELAY,
            max_delay: DEFAULT_SETTLE_MAX_DELAY,
            jitter_pct: DEFAULT_SETTLE_JITTER_PCT,
        }
    }
}

/// Loyalty reward parameters.
#[derive(Debug, Clone)]
pub struct LoyaltyConfig {
    /// Cumulative credits from one creator that earn a grant.
    pub threshold: u64,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOYALTY_THRESHOLD,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Metering loop parameters.
    pub metering: MeteringConfig,
    /// Settlement retry parameters.
    pub settlement: SettlementConfig,
    /// Loyalty reward parameters.
    pub loyalty: LoyaltyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_timeout_below_tick_period() {
        let config = MeteringConfig::default();
        assert!(config.channel_call_timeout < config.tick_period);
    }
}
