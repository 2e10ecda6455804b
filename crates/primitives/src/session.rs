//! Session data model: status machine, snapshot row, history entry.

use alloy_primitives::Address;

use crate::{AllocationRef, ContentId, SessionId, TxRef};

/// State of one listening session.
///
/// Transitions are one-directional:
///
/// ```text
/// Open ──> Closing ──> Settled
///                └───> Disputed
/// ```
///
/// `Settled` and `Disputed` are terminal. `Disputed` marks a session whose
/// settlement could not complete and needs manual reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum SessionStatus {
    /// Metering in progress; debits accepted.
    Open = 0,

    /// Close requested or balance exhausted; no further debits. Acts as
    /// the barrier between the metering loop and the settlement phases.
    Closing = 1,

    /// All close phases completed; history written.
    Settled = 2,

    /// Settlement could not complete; requires manual reconciliation.
    Disputed = 3,
}

impl SessionStatus {
    /// Returns true while debits are still accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Open)
    }

    /// Returns true once no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Settled | SessionStatus::Disputed)
    }
}

/// Snapshot of one listen-through of one track by one listener.
///
/// The live row lives in the ledger store; this is a point-in-time copy
/// returned across the API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Session {
    /// Unique id assigned at creation.
    pub session_id: SessionId,
    /// The paying listener.
    pub listener_id: Address,
    /// The earning creator.
    pub creator_id: Address,
    /// Track being streamed.
    pub content_id: ContentId,
    /// Unix timestamp of session start.
    pub started_at: u64,
    /// Credits debited so far. Monotone, only grows while `Open`.
    pub credits_consumed: u64,
    /// Channel allocation handle, if one was opened.
    pub channel_ref: Option<AllocationRef>,
    /// Custodial settlement transaction, once phase 2 succeeded.
    pub settlement_tx: Option<TxRef>,
    /// Current lifecycle state.
    pub status: SessionStatus,
}

/// Immutable record of one settled session, appended exactly once.
///
/// This log is the source of truth for loyalty totals; eligibility is
/// recomputed from it rather than kept in a separately mutable counter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamHistoryEntry {
    /// The paying listener.
    pub listener_id: Address,
    /// The paid creator.
    pub creator_id: Address,
    /// Track that was streamed.
    pub content_id: ContentId,
    /// Session the entry finalizes. Unique across the log.
    pub session_id: SessionId,
    /// Credits actually settled listener -> creator.
    pub credits_paid: u64,
    /// Seconds of metered playback.
    pub duration_seconds: u64,
    /// Unix timestamp of settlement.
    pub settled_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Open.to_string(), "open");
        assert_eq!(SessionStatus::Disputed.to_string(), "disputed");
    }

    #[test]
    fn test_status_from_repr() {
        assert_eq!(SessionStatus::from_repr(0), Some(SessionStatus::Open));
        assert_eq!(SessionStatus::from_repr(2), Some(SessionStatus::Settled));
        assert_eq!(SessionStatus::from_repr(9), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Open.is_open());
        assert!(!SessionStatus::Closing.is_open());
        assert!(SessionStatus::Settled.is_terminal());
        assert!(SessionStatus::Disputed.is_terminal());
        assert!(!SessionStatus::Closing.is_terminal());
    }
}
