//! Three-phase close coordinator.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error, warn};

use cadence_api::{EngineConfig, LedgerError, LedgerStore};
use cadence_channel::ChannelClient;
use cadence_primitives::{
    AllocationSplit, LoyaltyGrant, Session, SessionId, SessionStatus, StreamHistoryEntry, TxRef,
    unix_now,
};

use crate::backoff::RetryPolicy;
use crate::client::SettlementClient;
use crate::error::{CloseError, SettlementError};

/// Final accounting for one closed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReceipt {
    /// The session closed out.
    pub session_id: SessionId,
    /// Terminal status reached (always `Settled` on the `Ok` path).
    pub status: SessionStatus,
    /// Credits settled listener -> creator.
    pub credits_consumed: u64,
    /// Custodial transaction, `None` for zero-consumption sessions.
    pub settlement_tx: Option<TxRef>,
    /// Loyalty grant held by the pair after this close, if any.
    pub loyalty_grant: Option<LoyaltyGrant>,
}

/// Runs the close sequence for sessions that left metering.
///
/// One coordinator serves the whole process; per-session exclusivity
/// comes from the `Open -> Closing` compare-and-swap that every caller
/// must win before invoking [`settle`](SettlementCoordinator::settle).
pub struct SettlementCoordinator<L> {
    ledger: Arc<L>,
    channel: ChannelClient,
    settlement: SettlementClient,
    retry: RetryPolicy,
    loyalty_threshold: u64,
    channel_call_timeout: Duration,
}

impl<L: LedgerStore> SettlementCoordinator<L> {
    /// Create a coordinator over the given collaborators.
    pub fn new(
        ledger: Arc<L>,
        channel: ChannelClient,
        settlement: SettlementClient,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            channel,
            settlement,
            retry: RetryPolicy::from(&config.settlement),
            loyalty_threshold: config.loyalty.threshold,
            channel_call_timeout: config.metering.channel_call_timeout,
        }
    }

    /// Run the three-phase close for a session already in `Closing`.
    ///
    /// Re-entering for an already settled session returns its receipt
    /// without side effects, which is what lets the recovery pass re-run
    /// a close that crashed between phases.
    pub async fn settle(&self, session_id: SessionId) -> Result<CloseReceipt, CloseError> {
        let session = self
            .ledger
            .session(session_id)
            .ok_or(CloseError::UnknownSession {
                session: session_id,
            })?;

        match session.status {
            SessionStatus::Closing => {}
            SessionStatus::Settled => return Ok(self.receipt(&session)),
            SessionStatus::Disputed => {
                return Err(CloseError::Disputed {
                    session: session_id,
                    reason: "previously disputed".into(),
                });
            }
            SessionStatus::Open => {
                return Err(CloseError::NotClosing {
                    session: session_id,
                    status: SessionStatus::Open,
                });
            }
        }

        self.close_channel(&session).await;
        let tx = self.execute_settlement(&session).await?;
        self.finalize(&session, tx)
    }

    /// Close out every session still `Open` or `Closing`: the shutdown
    /// drain and the crash-recovery pass. Sessions are settled with their
    /// last durably recorded consumption.
    pub async fn recover(&self) -> Vec<Result<CloseReceipt, CloseError>> {
        let stuck = self
            .ledger
            .sessions_with_status(&[SessionStatus::Open, SessionStatus::Closing]);

        let mut results = Vec::with_capacity(stuck.len());
        for session in stuck {
            // Still-open rows first need the barrier; losing the swap just
            // means another closer got there, settle() sorts it out.
            let _ = self.ledger.compare_and_swap_status(
                session.session_id,
                SessionStatus::Open,
                SessionStatus::Closing,
            );
            results.push(self.settle(session.session_id).await);
        }
        results
    }

    /// Phase 1: advisory channel close. Never fails the sequence.
    async fn close_channel(&self, session: &Session) {
        let Some(allocation) = session.channel_ref else {
            debug!(session = %session.session_id, "no channel allocation, skipping close");
            return;
        };
        if !self.channel.is_configured() {
            debug!(session = %session.session_id, "channel unconfigured, skipping close");
            return;
        }

        let split = AllocationSplit {
            listener_remaining: self.ledger.balance(session.listener_id),
            creator_earned: session.credits_consumed,
        };

        let close = self.channel.close_allocation(allocation, split);
        match tokio::time::timeout(self.channel_call_timeout, close).await {
            Ok(Ok(())) => debug!(session = %session.session_id, %allocation, "channel closed"),
            Ok(Err(e)) => {
                warn!(session = %session.session_id, error = %e, "channel close failed, continuing")
            }
            Err(_) => {
                warn!(session = %session.session_id, "channel close timed out, continuing")
            }
        }
    }

    /// Phase 2: authoritative custodial settlement with bounded retries.
    async fn execute_settlement(&self, session: &Session) -> Result<Option<TxRef>, CloseError> {
        if session.credits_consumed == 0 {
            return Ok(None);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .settlement
                .execute(
                    session.listener_id,
                    session.creator_id,
                    session.credits_consumed,
                )
                .await
            {
                Ok(tx) => {
                    self.ledger.set_settlement_tx(session.session_id, tx)?;
                    counter!("cadence_settlements_total").increment(1);
                    debug!(
                        session = %session.session_id,
                        amount = session.credits_consumed,
                        %tx,
                        "settlement executed"
                    );
                    return Ok(Some(tx));
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    counter!("cadence_settlement_retries_total").increment(1);
                    let delay = self.retry.next_delay(attempt);
                    warn!(
                        session = %session.session_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient settlement failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(self.dispute(session, attempt, e)),
            }
        }
    }

    /// Settlement cannot complete: surface the conflict, never guess.
    fn dispute(&self, session: &Session, attempts: u32, cause: SettlementError) -> CloseError {
        error!(
            session = %session.session_id,
            attempts,
            error = %cause,
            "settlement failed permanently, disputing session"
        );
        counter!("cadence_sessions_disputed_total").increment(1);

        if let Err(e) = self.ledger.compare_and_swap_status(
            session.session_id,
            SessionStatus::Closing,
            SessionStatus::Disputed,
        ) {
            error!(session = %session.session_id, error = %e, "failed to mark session disputed");
        }

        CloseError::Disputed {
            session: session.session_id,
            reason: cause.to_string(),
        }
    }

    /// Phase 3: idempotent ledger finalize.
    fn finalize(&self, session: &Session, tx: Option<TxRef>) -> Result<CloseReceipt, CloseError> {
        let entry = StreamHistoryEntry {
            listener_id: session.listener_id,
            creator_id: session.creator_id,
            content_id: session.content_id,
            session_id: session.session_id,
            credits_paid: session.credits_consumed,
            duration_seconds: session.credits_consumed,
            settled_at: unix_now(),
        };

        match self.ledger.append_history(entry) {
            Ok(()) => {}
            // A crashed close already got here; uniqueness on session_id
            // makes the re-run harmless.
            Err(LedgerError::DuplicateHistory { .. }) => {
                debug!(session = %session.session_id, "history already written")
            }
            Err(e) => return Err(e.into()),
        }

        match self.ledger.compare_and_swap_status(
            session.session_id,
            SessionStatus::Closing,
            SessionStatus::Settled,
        ) {
            Ok(()) => {}
            Err(LedgerError::StatusConflict {
                actual: SessionStatus::Settled,
                ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        let loyalty_grant = cadence_loyalty::check_and_grant(
            self.ledger.as_ref(),
            session.listener_id,
            session.creator_id,
            self.loyalty_threshold,
        )?;

        counter!("cadence_sessions_settled_total").increment(1);

        Ok(CloseReceipt {
            session_id: session.session_id,
            status: SessionStatus::Settled,
            credits_consumed: session.credits_consumed,
            settlement_tx: tx,
            loyalty_grant,
        })
    }

    /// Receipt for a session that already reached `Settled`.
    fn receipt(&self, session: &Session) -> CloseReceipt {
        CloseReceipt {
            session_id: session.session_id,
            status: session.status,
            credits_consumed: session.credits_consumed,
            settlement_tx: session.settlement_tx,
            loyalty_grant: self
                .ledger
                .grant_for_pair(session.listener_id, session.creator_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    use alloy_primitives::Address;
    use cadence_api::EngineConfig;
    use cadence_ledger::MemoryLedger;
    use cadence_primitives::ContentId;

    use crate::client::{InProcessSettlement, SettlementService};

    fn test_listener() -> Address {
        Address::from([1u8; 20])
    }

    fn test_creator() -> Address {
        Address::from([2u8; 20])
    }

    /// Ledger seeded with one session already behind the closing barrier.
    fn closing_session(ledger: &MemoryLedger, id: u8, consumed: u64) -> SessionId {
        let session_id = SessionId::from([id; 32]);
        ledger
            .insert_session(Session {
                session_id,
                listener_id: test_listener(),
                creator_id: test_creator(),
                content_id: ContentId::from([3u8; 32]),
                started_at: 1_000,
                credits_consumed: 0,
                channel_ref: None,
                settlement_tx: None,
                status: SessionStatus::Open,
            })
            .unwrap();
        if consumed > 0 {
            ledger.add_consumed(session_id, consumed).unwrap();
        }
        ledger
            .compare_and_swap_status(session_id, SessionStatus::Open, SessionStatus::Closing)
            .unwrap();
        session_id
    }

    fn coordinator(
        ledger: &Arc<MemoryLedger>,
        settlement: SettlementClient,
    ) -> SettlementCoordinator<MemoryLedger> {
        SettlementCoordinator::new(
            Arc::clone(ledger),
            ChannelClient::Unconfigured,
            settlement,
            &EngineConfig::default(),
        )
    }

    /// Fails transiently a scripted number of times, then succeeds.
    struct FlakyService {
        failures_left: Mutex<u32>,
        inner: InProcessSettlement,
    }

    impl FlakyService {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                inner: InProcessSettlement::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl SettlementService for FlakyService {
        async fn execute(
            &self,
            payer: Address,
            payee: Address,
            amount: u64,
        ) -> Result<TxRef, SettlementError> {
            let should_fail = {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    true
                } else {
                    false
                }
            };
            if should_fail {
                return Err(SettlementError::Transient {
                    reason: "connection reset".into(),
                });
            }
            self.inner.execute(payer, payee, amount).await
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    /// Always rejects.
    struct RejectingService;

    #[async_trait::async_trait]
    impl SettlementService for RejectingService {
        async fn execute(
            &self,
            _payer: Address,
            _payee: Address,
            _amount: u64,
        ) -> Result<TxRef, SettlementError> {
            Err(SettlementError::Rejected {
                reason: "custodial balance insufficient".into(),
            })
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn test_settles_and_writes_history_once() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 3);
        let service = Arc::new(InProcessSettlement::new());
        let coordinator = coordinator(&ledger, SettlementClient::Service(service.clone()));

        let receipt = coordinator.settle(session_id).await.unwrap();
        assert_eq!(receipt.status, SessionStatus::Settled);
        assert_eq!(receipt.credits_consumed, 3);
        assert!(receipt.settlement_tx.is_some());

        assert_eq!(service.executed(), vec![(test_listener(), test_creator(), 3)]);
        assert_eq!(ledger.earnings(test_creator()).len(), 1);

        // Idempotent re-entry: same receipt, no second entry or transfer.
        let again = coordinator.settle(session_id).await.unwrap();
        assert_eq!(again.credits_consumed, 3);
        assert_eq!(service.executed().len(), 1);
        assert_eq!(ledger.earnings(test_creator()).len(), 1);
    }

    #[tokio::test]
    async fn test_zero_consumption_skips_settlement() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 0);
        let service = Arc::new(InProcessSettlement::new());
        let coordinator = coordinator(&ledger, SettlementClient::Service(service.clone()));

        let receipt = coordinator.settle(session_id).await.unwrap();
        assert_eq!(receipt.status, SessionStatus::Settled);
        assert_eq!(receipt.settlement_tx, None);
        assert!(service.executed().is_empty());
        assert_eq!(ledger.earnings(test_creator()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_to_success() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 5);
        let service = Arc::new(FlakyService::new(2));
        let coordinator = coordinator(&ledger, SettlementClient::Service(service.clone()));

        // Two transient failures, success on the third attempt.
        let receipt = coordinator.settle(session_id).await.unwrap();
        assert_eq!(receipt.status, SessionStatus::Settled);
        assert_eq!(
            service.inner.executed(),
            vec![(test_listener(), test_creator(), 5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_disputes() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 5);
        // More failures than the default 5-attempt ceiling.
        let service = Arc::new(FlakyService::new(99));
        let coordinator = coordinator(&ledger, SettlementClient::Service(service));

        assert_matches!(
            coordinator.settle(session_id).await,
            Err(CloseError::Disputed { .. })
        );
        assert_eq!(
            ledger.session_status(session_id),
            Some(SessionStatus::Disputed)
        );
        // No history for a disputed session.
        assert!(ledger.earnings(test_creator()).is_empty());
    }

    #[tokio::test]
    async fn test_rejection_disputes_immediately() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 5);
        let coordinator = coordinator(&ledger, SettlementClient::Service(Arc::new(RejectingService)));

        assert_matches!(
            coordinator.settle(session_id).await,
            Err(CloseError::Disputed { .. })
        );
        assert_eq!(
            ledger.session_status(session_id),
            Some(SessionStatus::Disputed)
        );
    }

    #[tokio::test]
    async fn test_unconfigured_settlement_disputes_consumption() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 5);
        let coordinator = coordinator(&ledger, SettlementClient::Unconfigured);

        assert_matches!(
            coordinator.settle(session_id).await,
            Err(CloseError::Disputed { .. })
        );
    }

    #[tokio::test]
    async fn test_unconfigured_settlement_fine_for_zero_consumption() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = closing_session(&ledger, 7, 0);
        let coordinator = coordinator(&ledger, SettlementClient::Unconfigured);

        let receipt = coordinator.settle(session_id).await.unwrap();
        assert_eq!(receipt.status, SessionStatus::Settled);
    }

    #[tokio::test]
    async fn test_settle_before_barrier_refused() {
        let ledger = Arc::new(MemoryLedger::new());
        let session_id = SessionId::from([9u8; 32]);
        ledger
            .insert_session(Session {
                session_id,
                listener_id: test_listener(),
                creator_id: test_creator(),
                content_id: ContentId::from([3u8; 32]),
                started_at: 1_000,
                credits_consumed: 0,
                channel_ref: None,
                settlement_tx: None,
                status: SessionStatus::Open,
            })
            .unwrap();
        let coordinator = coordinator(&ledger, SettlementClient::Unconfigured);

        assert_matches!(
            coordinator.settle(session_id).await,
            Err(CloseError::NotClosing {
                status: SessionStatus::Open,
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_recover_drains_open_and_closing() {
        let ledger = Arc::new(MemoryLedger::new());
        let closing = closing_session(&ledger, 1, 4);
        // A second session left open, as after a crash.
        let open = SessionId::from([2u8; 32]);
        ledger
            .insert_session(Session {
                session_id: open,
                listener_id: test_listener(),
                creator_id: test_creator(),
                content_id: ContentId::from([3u8; 32]),
                started_at: 1_000,
                credits_consumed: 0,
                channel_ref: None,
                settlement_tx: None,
                status: SessionStatus::Open,
            })
            .unwrap();
        ledger.add_consumed(open, 2).unwrap();

        let service = Arc::new(InProcessSettlement::new());
        let coordinator = coordinator(&ledger, SettlementClient::Service(service.clone()));

        let results = coordinator.recover().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));

        assert_eq!(ledger.session_status(closing), Some(SessionStatus::Settled));
        assert_eq!(ledger.session_status(open), Some(SessionStatus::Settled));
        assert_eq!(service.executed().len(), 2);
    }
}
