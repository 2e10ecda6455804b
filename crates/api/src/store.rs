//! Persistent store and catalog contracts.

use alloy_primitives::Address;
use cadence_primitives::{
    AllocationRef, ContentId, LoyaltyGrant, Session, SessionId, SessionStatus, StreamHistoryEntry,
    TrackInfo, TxRef,
};

use crate::error::LedgerError;

/// Typed accessor to the persistent store.
///
/// Every method is one atomic step: balance mutations are single
/// compare-exchange operations, status transitions are compare-and-swap,
/// and the history append enforces uniqueness on `session_id`. The core
/// relies on exactly this granularity for its interleaving guarantees and
/// never composes a read-then-write across two calls.
///
/// Methods are synchronous; a driver for a remote store wraps them at the
/// boundary rather than forcing the metering tick through an executor
/// round-trip.
pub trait LedgerStore: Send + Sync + 'static {
    /// Credit an account, creating it at zero if absent. Returns the new
    /// balance.
    fn deposit(&self, account: Address, amount: u64) -> u64;

    /// Atomically debit an account, rejecting the whole amount if the
    /// balance would go negative. Returns the new balance.
    fn try_debit(&self, account: Address, amount: u64) -> Result<u64, LedgerError>;

    /// Current balance, zero for unknown accounts.
    fn balance(&self, account: Address) -> u64;

    /// Insert a fresh session row.
    fn insert_session(&self, session: Session) -> Result<(), LedgerError>;

    /// Snapshot of a session row.
    fn session(&self, id: SessionId) -> Option<Session>;

    /// Just the status, cheaper than a full snapshot on the tick path.
    fn session_status(&self, id: SessionId) -> Option<SessionStatus>;

    /// Atomically transition `from -> to`, failing with
    /// [`LedgerError::StatusConflict`] if the current status is not `from`.
    fn compare_and_swap_status(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<(), LedgerError>;

    /// Atomically grow `credits_consumed`, only while the session is open.
    /// Returns the new total.
    fn add_consumed(&self, id: SessionId, amount: u64) -> Result<u64, LedgerError>;

    /// Record the channel allocation handle opened for this session.
    fn set_channel_ref(&self, id: SessionId, allocation: AllocationRef) -> Result<(), LedgerError>;

    /// Record the custodial settlement transaction for this session.
    fn set_settlement_tx(&self, id: SessionId, tx: TxRef) -> Result<(), LedgerError>;

    /// All sessions currently in one of the given states. Used by the
    /// shutdown drain and the recovery pass.
    fn sessions_with_status(&self, statuses: &[SessionStatus]) -> Vec<Session>;

    /// Append one immutable history entry, rejecting a second entry for
    /// the same session with [`LedgerError::DuplicateHistory`].
    fn append_history(&self, entry: StreamHistoryEntry) -> Result<(), LedgerError>;

    /// History rows for one (listener, creator) pair, the loyalty source
    /// of truth.
    fn history_for_pair(&self, listener: Address, creator: Address) -> Vec<StreamHistoryEntry>;

    /// History rows earning for one creator, most recent last.
    fn earnings(&self, creator: Address) -> Vec<StreamHistoryEntry>;

    /// Insert a loyalty grant unless one already exists for the pair.
    /// Returns `true` if this call created the grant.
    fn insert_grant(&self, grant: LoyaltyGrant) -> Result<bool, LedgerError>;

    /// The grant for a pair, if one was ever created.
    fn grant_for_pair(&self, listener: Address, creator: Address) -> Option<LoyaltyGrant>;
}

/// Read-only track lookup, consulted once at session start.
///
/// Registration and storage of tracks is an external concern; the engine
/// only needs existence, the earning creator, and access restrictions.
pub trait ContentCatalog: Send + Sync + 'static {
    /// The catalog row for a track, if it exists.
    fn track(&self, content: ContentId) -> Option<TrackInfo>;
}
