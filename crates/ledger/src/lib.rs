//! Atomic in-memory ledger store.
//!
//! Implements [`LedgerStore`] over process memory. Every operation the
//! engine core depends on is one atomic step:
//!
//! - balances use a compare-exchange check-and-decrement, so a debit that
//!   would go negative is rejected without a read-then-write window
//! - session status lives in an atomic byte, transitioned only by
//!   compare-and-swap
//! - the history log rejects a second entry per session under one lock
//!
//! The store is the dev/test stand-in for the external persistent store;
//! it defines the exact semantics a remote driver has to provide.

mod balance;
mod catalog;
mod history;
mod sessions;

pub use balance::BalanceState;
pub use catalog::MemoryCatalog;
pub use history::HistoryLog;

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;

use cadence_api::{LedgerError, LedgerStore};
use cadence_primitives::{
    AllocationRef, LoyaltyGrant, Session, SessionId, SessionStatus, StreamHistoryEntry, TxRef,
};

use crate::sessions::SessionRecord;

/// In-memory [`LedgerStore`] implementation.
#[derive(Default)]
pub struct MemoryLedger {
    balances: DashMap<Address, Arc<BalanceState>>,
    sessions: DashMap<SessionId, Arc<SessionRecord>>,
    history: HistoryLog,
    grants: DashMap<(Address, Address), LoyaltyGrant>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn balance_state(&self, account: Address) -> Arc<BalanceState> {
        self.balances
            .entry(account)
            .or_insert_with(|| Arc::new(BalanceState::new(0)))
            .clone()
    }

    fn record(&self, id: SessionId) -> Result<Arc<SessionRecord>, LedgerError> {
        self.sessions
            .get(&id)
            .map(|r| Arc::clone(&r))
            .ok_or(LedgerError::UnknownSession { session: id })
    }
}

impl LedgerStore for MemoryLedger {
    fn deposit(&self, account: Address, amount: u64) -> u64 {
        self.balance_state(account).deposit(amount)
    }

    fn try_debit(&self, account: Address, amount: u64) -> Result<u64, LedgerError> {
        let state = self.balance_state(account);
        state
            .try_debit(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account,
                balance: state.get(),
                amount,
            })
    }

    fn balance(&self, account: Address) -> u64 {
        self.balances.get(&account).map(|s| s.get()).unwrap_or(0)
    }

    fn insert_session(&self, session: Session) -> Result<(), LedgerError> {
        match self.sessions.entry(session.session_id) {
            dashmap::Entry::Occupied(_) => Err(LedgerError::DuplicateSession {
                session: session.session_id,
            }),
            dashmap::Entry::Vacant(slot) => {
                let _ = slot.insert(Arc::new(SessionRecord::new(session)));
                Ok(())
            }
        }
    }

    fn session(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|r| r.snapshot())
    }

    fn session_status(&self, id: SessionId) -> Option<SessionStatus> {
        self.sessions.get(&id).map(|r| r.status())
    }

    fn compare_and_swap_status(
        &self,
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<(), LedgerError> {
        self.record(id)?
            .cas_status(from, to)
            .map_err(|actual| LedgerError::StatusConflict {
                session: id,
                expected: from,
                actual,
            })
    }

    fn add_consumed(&self, id: SessionId, amount: u64) -> Result<u64, LedgerError> {
        self.record(id)?
            .add_consumed(amount)
            .map_err(|status| LedgerError::SessionNotOpen {
                session: id,
                status,
            })
    }

    fn set_channel_ref(&self, id: SessionId, allocation: AllocationRef) -> Result<(), LedgerError> {
        self.record(id)?.set_channel_ref(allocation);
        Ok(())
    }

    fn set_settlement_tx(&self, id: SessionId, tx: TxRef) -> Result<(), LedgerError> {
        self.record(id)?.set_settlement_tx(tx);
        Ok(())
    }

    fn sessions_with_status(&self, statuses: &[SessionStatus]) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|r| statuses.contains(&r.status()))
            .map(|r| r.snapshot())
            .collect()
    }

    fn append_history(&self, entry: StreamHistoryEntry) -> Result<(), LedgerError> {
        self.history.append(entry)
    }

    fn history_for_pair(&self, listener: Address, creator: Address) -> Vec<StreamHistoryEntry> {
        self.history.for_pair(listener, creator)
    }

    fn earnings(&self, creator: Address) -> Vec<StreamHistoryEntry> {
        self.history.earnings(creator)
    }

    fn insert_grant(&self, grant: LoyaltyGrant) -> Result<bool, LedgerError> {
        match self.grants.entry((grant.listener_id, grant.creator_id)) {
            dashmap::Entry::Occupied(_) => Ok(false),
            dashmap::Entry::Vacant(slot) => {
                let _ = slot.insert(grant);
                Ok(true)
            }
        }
    }

    fn grant_for_pair(&self, listener: Address, creator: Address) -> Option<LoyaltyGrant> {
        self.grants.get(&(listener, creator)).map(|g| g.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cadence_primitives::ContentId;

    fn test_listener() -> Address {
        Address::from([1u8; 20])
    }

    fn test_creator() -> Address {
        Address::from([2u8; 20])
    }

    fn test_session(id: u8) -> Session {
        Session {
            session_id: SessionId::from([id; 32]),
            listener_id: test_listener(),
            creator_id: test_creator(),
            content_id: ContentId::from([3u8; 32]),
            started_at: 1_000,
            credits_consumed: 0,
            channel_ref: None,
            settlement_tx: None,
            status: SessionStatus::Open,
        }
    }

    #[test]
    fn test_deposit_and_debit() {
        let ledger = MemoryLedger::new();

        assert_eq!(ledger.deposit(test_listener(), 10), 10);
        assert_eq!(ledger.try_debit(test_listener(), 3), Ok(7));
        assert_eq!(ledger.balance(test_listener()), 7);
    }

    #[test]
    fn test_debit_rejected_at_zero() {
        let ledger = MemoryLedger::new();
        ledger.deposit(test_listener(), 1);

        assert_eq!(ledger.try_debit(test_listener(), 1), Ok(0));
        assert_matches!(
            ledger.try_debit(test_listener(), 1),
            Err(LedgerError::InsufficientFunds { balance: 0, .. })
        );
    }

    #[test]
    fn test_debit_unknown_account() {
        let ledger = MemoryLedger::new();

        assert_matches!(
            ledger.try_debit(test_listener(), 1),
            Err(LedgerError::InsufficientFunds { balance: 0, .. })
        );
    }

    #[test]
    fn test_session_roundtrip() {
        let ledger = MemoryLedger::new();
        let session = test_session(7);

        ledger.insert_session(session.clone()).unwrap();
        assert_eq!(ledger.session(session.session_id), Some(session.clone()));
        assert_matches!(
            ledger.insert_session(session),
            Err(LedgerError::DuplicateSession { .. })
        );
    }

    #[test]
    fn test_status_cas_at_most_once() {
        let ledger = MemoryLedger::new();
        let session = test_session(7);
        ledger.insert_session(session.clone()).unwrap();

        ledger
            .compare_and_swap_status(session.session_id, SessionStatus::Open, SessionStatus::Closing)
            .unwrap();

        // A concurrent second close request loses the swap.
        assert_matches!(
            ledger.compare_and_swap_status(
                session.session_id,
                SessionStatus::Open,
                SessionStatus::Closing
            ),
            Err(LedgerError::StatusConflict {
                actual: SessionStatus::Closing,
                ..
            })
        );
    }

    #[test]
    fn test_consumed_rejected_after_close() {
        let ledger = MemoryLedger::new();
        let session = test_session(7);
        ledger.insert_session(session.clone()).unwrap();

        assert_eq!(ledger.add_consumed(session.session_id, 1), Ok(1));
        assert_eq!(ledger.add_consumed(session.session_id, 1), Ok(2));

        ledger
            .compare_and_swap_status(session.session_id, SessionStatus::Open, SessionStatus::Closing)
            .unwrap();

        assert_matches!(
            ledger.add_consumed(session.session_id, 1),
            Err(LedgerError::SessionNotOpen {
                status: SessionStatus::Closing,
                ..
            })
        );
        assert_eq!(
            ledger.session(session.session_id).map(|s| s.credits_consumed),
            Some(2)
        );
    }

    #[test]
    fn test_grant_inserted_once() {
        let ledger = MemoryLedger::new();
        let grant = LoyaltyGrant {
            listener_id: test_listener(),
            creator_id: test_creator(),
            name: "fan-abc".into(),
            total_at_grant: 102,
            granted_at: 2_000,
        };

        assert_eq!(ledger.insert_grant(grant.clone()), Ok(true));
        assert_eq!(ledger.insert_grant(grant.clone()), Ok(false));
        assert_eq!(
            ledger.grant_for_pair(test_listener(), test_creator()),
            Some(grant)
        );
    }

    #[test]
    fn test_sessions_with_status() {
        let ledger = MemoryLedger::new();
        ledger.insert_session(test_session(1)).unwrap();
        ledger.insert_session(test_session(2)).unwrap();
        ledger
            .compare_and_swap_status(
                SessionId::from([2u8; 32]),
                SessionStatus::Open,
                SessionStatus::Closing,
            )
            .unwrap();

        let open = ledger.sessions_with_status(&[SessionStatus::Open]);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].session_id, SessionId::from([1u8; 32]));

        let live = ledger.sessions_with_status(&[SessionStatus::Open, SessionStatus::Closing]);
        assert_eq!(live.len(), 2);
    }
}
