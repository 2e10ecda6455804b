//! Events emitted by the metering loop to the session's caller.

/// Per-tick progress and terminal events for one session.
///
/// Delivery is best-effort: a caller that stopped listening loses events,
/// never ticks. The ledger row remains the authoritative record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterEvent {
    /// One second of playback was metered and debited.
    Progress {
        /// Seconds of playback metered so far.
        seconds_played: u64,
        /// Listener balance after this tick's debit.
        credits_remaining: u64,
        /// Session consumption total after this tick.
        total_consumed: u64,
    },

    /// The listener's balance hit zero; the loop stopped and the session
    /// is being closed out.
    Exhausted,
}
