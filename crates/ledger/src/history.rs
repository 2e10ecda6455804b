//! Append-only stream history log.
//!
//! One entry per settled session, enforced under the log's own lock so a
//! re-run of the finalize phase cannot double-write. Loyalty totals are
//! recomputed from this log; there is no separate running counter to
//! drift from it.

use std::collections::HashSet;

use alloy_primitives::Address;
use parking_lot::RwLock;

use cadence_api::LedgerError;
use cadence_primitives::{SessionId, StreamHistoryEntry};

#[derive(Default)]
struct LogInner {
    entries: Vec<StreamHistoryEntry>,
    seen: HashSet<SessionId>,
}

/// Append-only log of settled sessions, unique per `session_id`.
#[derive(Default)]
pub struct HistoryLog {
    inner: RwLock<LogInner>,
}

impl HistoryLog {
    /// Append one entry, rejecting a duplicate for the same session.
    pub fn append(&self, entry: StreamHistoryEntry) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        if !inner.seen.insert(entry.session_id) {
            return Err(LedgerError::DuplicateHistory {
                session: entry.session_id,
            });
        }
        inner.entries.push(entry);
        Ok(())
    }

    /// Entries for one (listener, creator) pair, in append order.
    pub fn for_pair(&self, listener: Address, creator: Address) -> Vec<StreamHistoryEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.listener_id == listener && e.creator_id == creator)
            .cloned()
            .collect()
    }

    /// Entries earning for one creator, in append order.
    pub fn earnings(&self, creator: Address) -> Vec<StreamHistoryEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.creator_id == creator)
            .cloned()
            .collect()
    }

    /// Total entry count.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True if nothing has settled yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
