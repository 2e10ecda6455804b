//! Ledger error taxonomy.
//!
//! Variants carry typed data (not strings) so callers can branch on them
//! programmatically. Every variant here is a caller-visible condition, not
//! an internal fault: the in-memory store never fails spuriously, and a
//! remote store implementation maps its transport faults onto these before
//! they reach the core.

use alloy_primitives::Address;
use cadence_primitives::{SessionId, SessionStatus};

/// Error type for ledger store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A debit would have taken the balance below zero; nothing was changed.
    #[error("insufficient funds: account {account} has {balance}, needs {amount}")]
    InsufficientFunds {
        /// The account the debit targeted.
        account: Address,
        /// Balance at the time the debit was rejected.
        balance: u64,
        /// Amount the debit asked for.
        amount: u64,
    },

    /// No session row exists under this id.
    #[error("unknown session: {session}")]
    UnknownSession {
        /// The id that missed.
        session: SessionId,
    },

    /// A session row already exists under this id.
    #[error("duplicate session: {session}")]
    DuplicateSession {
        /// The colliding id.
        session: SessionId,
    },

    /// A status compare-and-swap observed a different current status.
    #[error("status conflict on {session}: expected {expected}, found {actual}")]
    StatusConflict {
        /// The session whose status was contested.
        session: SessionId,
        /// Status the caller expected to swap from.
        expected: SessionStatus,
        /// Status actually found.
        actual: SessionStatus,
    },

    /// Consumption was recorded against a session that is no longer open.
    #[error("session {session} is {status}, debits closed")]
    SessionNotOpen {
        /// The session the write targeted.
        session: SessionId,
        /// Its current (non-open) status.
        status: SessionStatus,
    },

    /// A history entry for this session was already appended.
    #[error("history entry already written for session {session}")]
    DuplicateHistory {
        /// The session already present in the log.
        session: SessionId,
    },
}
