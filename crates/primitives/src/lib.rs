//! Core primitive types for the cadence streaming payment engine.
//!
//! This crate provides the fundamental types shared across the stack,
//! kept separate to avoid circular dependencies.
//!
//! # Credits
//!
//! All amounts are in **credits**, the atomic unit of consumption: one
//! credit buys one second of streaming. Credits are plain `u64` values;
//! balances, consumption counters, and settlement amounts all share the
//! unit, so no conversion happens anywhere in the core.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Keccak256;
pub use alloy_primitives::{Address, B256};

mod session;

pub use session::{Session, SessionStatus, StreamHistoryEntry};

/// Content-addressed identifier of a streamable track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentId(pub B256);

impl From<[u8; 32]> for ContentId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// Opaque unique identifier of one listening session, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionId(pub B256);

impl SessionId {
    /// Derives a fresh session id:
    /// `keccak256(listener || content || started_at || seq)`.
    ///
    /// The process-local sequence counter keeps ids unique even when the
    /// same listener restarts the same track within one second.
    pub fn derive(listener: &Address, content: &ContentId, started_at: u64) -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);

        let mut hasher = Keccak256::new();
        hasher.update(listener);
        hasher.update(content.0);
        hasher.update(started_at.to_le_bytes());
        hasher.update(SEQ.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        Self(hasher.finalize())
    }
}

impl From<[u8; 32]> for SessionId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// Opaque handle to a two-party allocation held by the channel peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationRef(pub B256);

impl From<[u8; 32]> for AllocationRef {
    fn from(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl fmt::Display for AllocationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// Reference to an executed custodial settlement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxRef(pub B256);

impl From<[u8; 32]> for TxRef {
    fn from(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

/// How an allocation's deposit is split between the two parties.
///
/// Mirrors the ledger view: `listener_remaining + creator_earned` stays
/// constant for the lifetime of one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationSplit {
    /// Credits still belonging to the listener.
    pub listener_remaining: u64,
    /// Credits shifted to the creator so far.
    pub creator_earned: u64,
}

/// Catalog row for one streamable track.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Content id the track is addressed by.
    pub content_id: ContentId,
    /// Account of the creator who earns for this track.
    pub creator_id: Address,
    /// Human-readable title.
    pub title: String,
    /// Listeners barred from streaming this track.
    pub restricted: Vec<Address>,
}

impl TrackInfo {
    /// Returns true if the given listener may not stream this track.
    pub fn is_restricted(&self, listener: &Address) -> bool {
        self.restricted.contains(listener)
    }
}

/// One-time loyalty reward for a (listener, creator) pair.
///
/// At most one grant ever exists per pair; the store enforces uniqueness.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoyaltyGrant {
    /// The rewarded listener.
    pub listener_id: Address,
    /// The creator the loyalty is towards.
    pub creator_id: Address,
    /// Proposed registry name, deterministic over the pair.
    pub name: String,
    /// Cumulative credits consumed from this creator at grant time.
    pub total_at_grant: u64,
    /// Unix timestamp of the grant.
    pub granted_at: u64,
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_listener() -> Address {
        Address::from([1u8; 20])
    }

    fn test_content() -> ContentId {
        ContentId::from([2u8; 32])
    }

    #[test]
    fn test_session_id_unique_per_derive() {
        let a = SessionId::derive(&test_listener(), &test_content(), 1_000);
        let b = SessionId::derive(&test_listener(), &test_content(), 1_000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_track_restriction() {
        let blocked = Address::from([9u8; 20]);
        let track = TrackInfo {
            content_id: test_content(),
            creator_id: Address::from([3u8; 20]),
            title: "test track".into(),
            restricted: vec![blocked],
        };

        assert!(track.is_restricted(&blocked));
        assert!(!track.is_restricted(&test_listener()));
    }
}
