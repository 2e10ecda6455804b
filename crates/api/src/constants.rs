//! Default engine parameters.

use std::time::Duration;

/// One credit buys this much playback; the metering cadence.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Upper bound on any single channel peer call made from the session
/// paths. Must stay below [`DEFAULT_TICK_PERIOD`] so a hung peer can
/// never delay a tick.
pub const DEFAULT_CHANNEL_CALL_TIMEOUT: Duration = Duration::from_millis(800);

/// Attempt ceiling for transient settlement failures (first try included).
pub const DEFAULT_SETTLE_MAX_ATTEMPTS: u32 = 5;

/// First retry delay for transient settlement failures.
pub const DEFAULT_SETTLE_BASE_DELAY: Duration = Duration::from_millis(250);

/// Cap on the exponential settlement retry delay.
pub const DEFAULT_SETTLE_MAX_DELAY: Duration = Duration::from_secs(5);

/// Jitter applied to settlement retry delays, as a fraction of the delay.
pub const DEFAULT_SETTLE_JITTER_PCT: f64 = 0.25;

/// Cumulative credits from one creator that earn a loyalty grant.
pub const DEFAULT_LOYALTY_THRESHOLD: u64 = 100;
