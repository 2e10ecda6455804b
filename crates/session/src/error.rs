//! Session lifecycle errors.

use alloy_primitives::Address;
use cadence_api::LedgerError;
use cadence_primitives::{ContentId, SessionId, SessionStatus};

/// Errors from session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The listener has no credit to stream with. User-visible, not
    /// retried: the stream stops and the listener is told why.
    #[error("insufficient credit for listener {listener}")]
    InsufficientCredit {
        /// The broke listener.
        listener: Address,
    },

    /// No track exists under this content id.
    #[error("content not found: {content}")]
    ContentNotFound {
        /// The id that missed.
        content: ContentId,
    },

    /// The requester may not perform this operation.
    #[error("forbidden for account {account}")]
    Forbidden {
        /// The refused account.
        account: Address,
    },

    /// No session row exists under this id.
    #[error("unknown session: {session}")]
    NotFound {
        /// The id that missed.
        session: SessionId,
    },

    /// The session already left the open state; close was requested
    /// twice, or raced auto-stop on exhaustion.
    #[error("session {session} already {status}")]
    AlreadyClosed {
        /// The contested session.
        session: SessionId,
        /// Status found instead of open.
        status: SessionStatus,
    },

    /// An unexpected store-level failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
