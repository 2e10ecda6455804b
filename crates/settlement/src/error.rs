//! Settlement error taxonomy.

use cadence_api::LedgerError;
use cadence_primitives::{SessionId, SessionStatus};

/// Errors from the custodial settlement service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// No settlement service is configured for this process. Permanent:
    /// consumption that cannot be settled disputes the session rather
    /// than pretending success.
    #[error("settlement service not configured")]
    Unconfigured,

    /// The service could not complete the transfer right now; retrying
    /// may succeed.
    #[error("transient settlement failure: {reason}")]
    Transient {
        /// Description of the transient fault.
        reason: String,
    },

    /// The service definitively refused the transfer.
    #[error("settlement rejected: {reason}")]
    Rejected {
        /// The service's rejection reason.
        reason: String,
    },
}

impl SettlementError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SettlementError::Transient { .. })
    }
}

/// Errors from the close sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    /// No session row exists under this id.
    #[error("unknown session: {session}")]
    UnknownSession {
        /// The id that missed.
        session: SessionId,
    },

    /// The coordinator was invoked before the `Open -> Closing` barrier.
    #[error("session {session} is {status}, not closing")]
    NotClosing {
        /// The offending session.
        session: SessionId,
        /// Its current status.
        status: SessionStatus,
    },

    /// Settlement failed permanently; the session was marked disputed
    /// and needs manual reconciliation.
    #[error("session {session} disputed: {reason}")]
    Disputed {
        /// The disputed session.
        session: SessionId,
        /// Why settlement could not complete.
        reason: String,
    },

    /// An unexpected store-level failure during finalize.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
