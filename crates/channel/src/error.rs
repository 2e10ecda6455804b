//! Channel peer error taxonomy.
//!
//! Everything here is non-fatal to a session: the channel is advisory, so
//! callers log and continue. The variants exist so logs and operator
//! tooling can tell a missing configuration from a dead peer.

use cadence_primitives::AllocationRef;

/// Errors from channel peer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// No channel network is configured for this process.
    #[error("channel network not configured")]
    Unconfigured,

    /// The one-time authentication handshake was rejected.
    #[error("channel handshake failed: {reason}")]
    HandshakeFailed {
        /// Peer-supplied rejection reason.
        reason: String,
    },

    /// The peer did not respond or the connection dropped.
    #[error("channel peer unreachable: {reason}")]
    Unreachable {
        /// Description of the transport failure.
        reason: String,
    },

    /// The peer does not know the referenced allocation.
    #[error("unknown allocation: {allocation}")]
    UnknownAllocation {
        /// The handle the peer rejected.
        allocation: AllocationRef,
    },

    /// The service task is gone; commands can no longer be delivered.
    #[error("channel service stopped")]
    ServiceStopped,
}
