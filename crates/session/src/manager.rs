//! Session lifecycle manager.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};

use alloy_primitives::Address;
use cadence_api::{ContentCatalog, LedgerError, LedgerStore};
use cadence_primitives::{ContentId, Session, SessionId, SessionStatus, unix_now};

use crate::error::SessionError;

/// Creates, looks up, and closes session rows.
///
/// The manager owns session state transitions on the caller side; it
/// never touches balances (the metering loop does) and never settles
/// (the coordinator does).
pub struct SessionManager<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
}

impl<L, C> Clone for SessionManager<L, C> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<L: LedgerStore, C: ContentCatalog> SessionManager<L, C> {
    /// Create a manager over the given store and catalog.
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self { ledger, catalog }
    }

    /// Open a session for a listener on a track.
    ///
    /// Requires a positive balance and an unrestricted track. Does not
    /// open the payment channel; that happens at metering startup so a
    /// dead channel network can never block session creation.
    pub fn start_session(
        &self,
        listener: Address,
        content: ContentId,
    ) -> Result<Session, SessionError> {
        let track = self
            .catalog
            .track(content)
            .ok_or(SessionError::ContentNotFound { content })?;

        if track.is_restricted(&listener) {
            return Err(SessionError::Forbidden { account: listener });
        }

        if self.ledger.balance(listener) == 0 {
            return Err(SessionError::InsufficientCredit { listener });
        }

        let started_at = unix_now();
        let session = Session {
            session_id: SessionId::derive(&listener, &content, started_at),
            listener_id: listener,
            creator_id: track.creator_id,
            content_id: content,
            started_at,
            credits_consumed: 0,
            channel_ref: None,
            settlement_tx: None,
            status: SessionStatus::Open,
        };
        self.ledger.insert_session(session.clone())?;

        counter!("cadence_sessions_started_total").increment(1);
        info!(
            session = %session.session_id,
            %listener,
            creator = %session.creator_id,
            %content,
            "session started"
        );
        Ok(session)
    }

    /// Snapshot of a session row.
    pub fn session(&self, id: SessionId) -> Result<Session, SessionError> {
        self.ledger
            .session(id)
            .ok_or(SessionError::NotFound { session: id })
    }

    /// Request the close of an open session.
    ///
    /// A single compare-and-swap on the status guarantees at-most-once
    /// entry into the close sequence: if a client stop races auto-stop on
    /// exhaustion, exactly one of them wins and the loser sees
    /// [`SessionError::AlreadyClosed`].
    pub fn request_close(&self, id: SessionId, requester: Address) -> Result<(), SessionError> {
        let session = self.session(id)?;
        if session.listener_id != requester {
            return Err(SessionError::Forbidden { account: requester });
        }

        self.ledger
            .compare_and_swap_status(id, SessionStatus::Open, SessionStatus::Closing)
            .map_err(|e| match e {
                LedgerError::StatusConflict { actual, .. } => SessionError::AlreadyClosed {
                    session: id,
                    status: actual,
                },
                other => SessionError::Ledger(other),
            })?;

        debug!(session = %id, %requester, "close requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cadence_ledger::{MemoryCatalog, MemoryLedger};
    use cadence_primitives::TrackInfo;

    fn test_listener() -> Address {
        Address::from([1u8; 20])
    }

    fn test_creator() -> Address {
        Address::from([2u8; 20])
    }

    fn test_content() -> ContentId {
        ContentId::from([3u8; 32])
    }

    fn test_manager() -> SessionManager<MemoryLedger, MemoryCatalog> {
        let ledger = Arc::new(MemoryLedger::new());
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert_track(TrackInfo {
            content_id: test_content(),
            creator_id: test_creator(),
            title: "late heat".into(),
            restricted: Vec::new(),
        });
        SessionManager::new(ledger, catalog)
    }

    #[test]
    fn test_start_requires_credit() {
        let manager = test_manager();

        assert_matches!(
            manager.start_session(test_listener(), test_content()),
            Err(SessionError::InsufficientCredit { .. })
        );

        manager.ledger.deposit(test_listener(), 1);
        let session = manager.start_session(test_listener(), test_content()).unwrap();
        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(session.creator_id, test_creator());
        assert_eq!(session.credits_consumed, 0);
    }

    #[test]
    fn test_start_unknown_content() {
        let manager = test_manager();
        manager.ledger.deposit(test_listener(), 10);

        assert_matches!(
            manager.start_session(test_listener(), ContentId::from([9u8; 32])),
            Err(SessionError::ContentNotFound { .. })
        );
    }

    #[test]
    fn test_start_restricted_content() {
        let manager = test_manager();
        manager.ledger.deposit(test_listener(), 10);
        manager.catalog.insert_track(TrackInfo {
            content_id: ContentId::from([4u8; 32]),
            creator_id: test_creator(),
            title: "members only".into(),
            restricted: vec![test_listener()],
        });

        assert_matches!(
            manager.start_session(test_listener(), ContentId::from([4u8; 32])),
            Err(SessionError::Forbidden { .. })
        );
    }

    #[test]
    fn test_close_validates_owner() {
        let manager = test_manager();
        manager.ledger.deposit(test_listener(), 10);
        let session = manager.start_session(test_listener(), test_content()).unwrap();

        assert_matches!(
            manager.request_close(session.session_id, test_creator()),
            Err(SessionError::Forbidden { .. })
        );
        manager
            .request_close(session.session_id, test_listener())
            .unwrap();
    }

    #[test]
    fn test_close_at_most_once() {
        let manager = test_manager();
        manager.ledger.deposit(test_listener(), 10);
        let session = manager.start_session(test_listener(), test_content()).unwrap();

        manager
            .request_close(session.session_id, test_listener())
            .unwrap();
        assert_matches!(
            manager.request_close(session.session_id, test_listener()),
            Err(SessionError::AlreadyClosed {
                status: SessionStatus::Closing,
                ..
            })
        );
    }

    #[test]
    fn test_unknown_session() {
        let manager = test_manager();

        assert_matches!(
            manager.session(SessionId::from([8u8; 32])),
            Err(SessionError::NotFound { .. })
        );
    }
}
