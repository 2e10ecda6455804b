//! Live session rows.
//!
//! Status is an atomic byte transitioned only by compare-and-swap, which
//! is what makes a close request idempotent under races: exactly one
//! caller wins the `Open -> Closing` swap. The consumption counter grows
//! only while the status byte still reads `Open`; a tick that loses that
//! race refunds its debit instead of recording it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::RwLock;

use cadence_primitives::{AllocationRef, Session, SessionStatus, TxRef};

pub(crate) struct SessionRecord {
    base: Session,
    consumed: AtomicU64,
    status: AtomicU8,
    channel_ref: RwLock<Option<AllocationRef>>,
    settlement_tx: RwLock<Option<TxRef>>,
}

/// Only values written through `SessionStatus` ever land in the atomic.
fn decode(raw: u8) -> SessionStatus {
    SessionStatus::from_repr(raw).unwrap_or(SessionStatus::Disputed)
}

impl SessionRecord {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            consumed: AtomicU64::new(session.credits_consumed),
            status: AtomicU8::new(session.status as u8),
            channel_ref: RwLock::new(session.channel_ref),
            settlement_tx: RwLock::new(session.settlement_tx),
            base: session,
        }
    }

    pub(crate) fn status(&self) -> SessionStatus {
        decode(self.status.load(Ordering::Relaxed))
    }

    /// Swap `from -> to`, returning the actual status on contention.
    pub(crate) fn cas_status(
        &self,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<(), SessionStatus> {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::Relaxed, Ordering::Relaxed)
            .map(|_| ())
            .map_err(decode)
    }

    /// Grow the consumption counter while the session is open. Returns
    /// the new total, or the blocking status.
    pub(crate) fn add_consumed(&self, amount: u64) -> Result<u64, SessionStatus> {
        let status = self.status();
        if !status.is_open() {
            return Err(status);
        }
        Ok(self.consumed.fetch_add(amount, Ordering::Relaxed) + amount)
    }

    pub(crate) fn set_channel_ref(&self, allocation: AllocationRef) {
        *self.channel_ref.write() = Some(allocation);
    }

    pub(crate) fn set_settlement_tx(&self, tx: TxRef) {
        *self.settlement_tx.write() = Some(tx);
    }

    pub(crate) fn snapshot(&self) -> Session {
        Session {
            credits_consumed: self.consumed.load(Ordering::Relaxed),
            status: self.status(),
            channel_ref: *self.channel_ref.read(),
            settlement_tx: *self.settlement_tx.read(),
            ..self.base.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_primitives::{Address, ContentId, SessionId};

    fn test_record() -> SessionRecord {
        SessionRecord::new(Session {
            session_id: SessionId::from([7u8; 32]),
            listener_id: Address::from([1u8; 20]),
            creator_id: Address::from([2u8; 20]),
            content_id: ContentId::from([3u8; 32]),
            started_at: 1_000,
            credits_consumed: 0,
            channel_ref: None,
            settlement_tx: None,
            status: SessionStatus::Open,
        })
    }

    #[test]
    fn test_cas_single_winner() {
        let record = test_record();

        assert_eq!(
            record.cas_status(SessionStatus::Open, SessionStatus::Closing),
            Ok(())
        );
        assert_eq!(
            record.cas_status(SessionStatus::Open, SessionStatus::Closing),
            Err(SessionStatus::Closing)
        );
        assert_eq!(record.status(), SessionStatus::Closing);
    }

    #[test]
    fn test_consumed_monotone_while_open() {
        let record = test_record();

        assert_eq!(record.add_consumed(1), Ok(1));
        assert_eq!(record.add_consumed(1), Ok(2));

        record
            .cas_status(SessionStatus::Open, SessionStatus::Closing)
            .unwrap();
        assert_eq!(record.add_consumed(1), Err(SessionStatus::Closing));
        assert_eq!(record.snapshot().credits_consumed, 2);
    }

    #[test]
    fn test_snapshot_carries_refs() {
        let record = test_record();
        record.set_channel_ref(AllocationRef::from([9u8; 32]));
        record.set_settlement_tx(TxRef::from([8u8; 32]));

        let snap = record.snapshot();
        assert_eq!(snap.channel_ref, Some(AllocationRef::from([9u8; 32])));
        assert_eq!(snap.settlement_tx, Some(TxRef::from([8u8; 32])));
    }
}
