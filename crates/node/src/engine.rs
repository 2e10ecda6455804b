//! The engine: session registry, close routing, shutdown drain.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::gauge;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use alloy_primitives::Address;
use cadence_api::{ContentCatalog, EngineConfig, LedgerStore, MeterEvent};
use cadence_channel::ChannelClient;
use cadence_primitives::{
    ContentId, LoyaltyGrant, Session, SessionId, SessionStatus, StreamHistoryEntry, TxRef,
};
use cadence_session::{MeterCommand, MeterOutcome, MeteringLoop, SessionError, SessionManager};
use cadence_settlement::{CloseReceipt, SettlementClient, SettlementCoordinator};

use crate::error::EngineError;

/// Final accounting exposed to callers for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleResult {
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Credits debited over the session.
    pub credits_consumed: u64,
    /// Custodial settlement transaction, once phase 2 succeeded.
    pub settlement_tx: Option<TxRef>,
    /// Loyalty grant held by the (listener, creator) pair, if any.
    pub loyalty_grant: Option<LoyaltyGrant>,
}

struct SessionTask {
    control_tx: mpsc::UnboundedSender<MeterCommand>,
    join: JoinHandle<MeterOutcome>,
}

struct EngineInner<L, C> {
    ledger: Arc<L>,
    manager: SessionManager<L, C>,
    coordinator: SettlementCoordinator<L>,
    channel: ChannelClient,
    config: EngineConfig,
    sessions: DashMap<SessionId, SessionTask>,
}

/// The metered streaming session engine.
///
/// Cheap to clone; all clones share one registry and one coordinator.
pub struct Engine<L, C> {
    inner: Arc<EngineInner<L, C>>,
}

impl<L, C> Clone for Engine<L, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: LedgerStore, C: ContentCatalog> Engine<L, C> {
    pub(crate) fn assemble(
        ledger: Arc<L>,
        catalog: Arc<C>,
        channel: ChannelClient,
        settlement: SettlementClient,
        config: EngineConfig,
    ) -> Self {
        let manager = SessionManager::new(Arc::clone(&ledger), catalog);
        let coordinator =
            SettlementCoordinator::new(Arc::clone(&ledger), channel.clone(), settlement, &config);
        Self {
            inner: Arc::new(EngineInner {
                ledger,
                manager,
                coordinator,
                channel,
                config,
                sessions: DashMap::new(),
            }),
        }
    }

    /// Start a session and its metering loop.
    ///
    /// Returns the fresh session row and the stream of meter events for
    /// it. Must be called within a tokio runtime; the loop runs as its
    /// own task.
    pub fn start(
        &self,
        listener: Address,
        content: ContentId,
    ) -> Result<(Session, mpsc::UnboundedReceiver<MeterEvent>), EngineError> {
        let session = self.inner.manager.start_session(listener, content)?;
        let session_id = session.session_id;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let meter = MeteringLoop::new(
            session.clone(),
            Arc::clone(&self.inner.ledger),
            self.inner.channel.clone(),
            self.inner.config.metering.clone(),
            events_tx,
            control_rx,
        );

        let engine = self.clone();
        let join = tokio::spawn(async move {
            let outcome = meter.run().await;
            if outcome == MeterOutcome::Exhausted {
                engine.close_after_exhaustion(session_id, listener).await;
            }
            outcome
        });

        let _ = self
            .inner
            .sessions
            .insert(session_id, SessionTask { control_tx, join });
        gauge!("cadence_active_sessions").increment(1.0);

        Ok((session, events_rx))
    }

    /// Stop a session on the listener's request and run the close
    /// sequence. Returns the final accounting.
    pub async fn stop(
        &self,
        session_id: SessionId,
        requester: Address,
    ) -> Result<CloseReceipt, EngineError> {
        // Win the barrier first; losing it means someone else (a racing
        // stop, or auto-stop on exhaustion) owns the close.
        self.inner.manager.request_close(session_id, requester)?;

        if let Some((_, task)) = self.inner.sessions.remove(&session_id) {
            let _ = task.control_tx.send(MeterCommand::Stop);
            if let Err(e) = task.join.await {
                warn!(session = %session_id, error = %e, "metering task failed");
            }
            gauge!("cadence_active_sessions").decrement(1.0);
        }

        self.settle_closed(session_id).await
    }

    /// Settlement entry shared by every close path. Callers must already
    /// hold the `Open -> Closing` barrier and have stopped the loop.
    async fn settle_closed(&self, session_id: SessionId) -> Result<CloseReceipt, EngineError> {
        let receipt = self.inner.coordinator.settle(session_id).await?;
        info!(
            session = %session_id,
            credits = receipt.credits_consumed,
            status = %receipt.status,
            "session closed"
        );
        Ok(receipt)
    }

    /// Exhaustion hand-off: the loop already returned inside this task,
    /// so take the barrier and run the same close path a stop takes.
    async fn close_after_exhaustion(&self, session_id: SessionId, listener: Address) {
        match self.inner.manager.request_close(session_id, listener) {
            Ok(()) => {}
            // Lost the barrier to a concurrent stop; that caller settles.
            Err(SessionError::AlreadyClosed { .. }) => {
                debug!(session = %session_id, "exhaustion close raced an explicit stop");
                return;
            }
            Err(e) => {
                error!(session = %session_id, error = %e, "exhaustion close failed");
                return;
            }
        }

        if let Err(e) = self.settle_closed(session_id).await {
            error!(session = %session_id, error = %e, "exhaustion settlement failed");
        }

        // Deregister last so a concurrent shutdown can still wait on this
        // task and find the session settled rather than mid-close.
        if self.inner.sessions.remove(&session_id).is_some() {
            gauge!("cadence_active_sessions").decrement(1.0);
        }
    }

    /// Snapshot of a session row.
    pub fn session(&self, session_id: SessionId) -> Result<Session, EngineError> {
        Ok(self.inner.manager.session(session_id)?)
    }

    /// Final accounting for a session, at whatever stage it is in.
    pub fn settle_result(&self, session_id: SessionId) -> Result<SettleResult, EngineError> {
        let session = self.inner.manager.session(session_id)?;
        Ok(SettleResult {
            status: session.status,
            credits_consumed: session.credits_consumed,
            settlement_tx: session.settlement_tx,
            loyalty_grant: self
                .inner
                .ledger
                .grant_for_pair(session.listener_id, session.creator_id),
        })
    }

    /// Credit a listener's account. Returns the new balance.
    pub fn deposit(&self, listener: Address, amount: u64) -> u64 {
        self.inner.ledger.deposit(listener, amount)
    }

    /// Current balance of an account.
    pub fn balance(&self, account: Address) -> u64 {
        self.inner.ledger.balance(account)
    }

    /// Creator-facing earnings history.
    pub fn earnings(&self, creator: Address) -> Vec<StreamHistoryEntry> {
        self.inner.ledger.earnings(creator)
    }

    /// Drain every live session through settlement.
    ///
    /// Stops all metering loops, waits for them (and for any in-flight
    /// exhaustion close), then closes out every session still open or
    /// closing with its last recorded consumption. No session is lost
    /// silently.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        info!(live_sessions = ids.len(), "draining engine");

        for id in &ids {
            if let Some(task) = self.inner.sessions.get(id) {
                let _ = task.control_tx.send(MeterCommand::Stop);
            }
        }
        for id in &ids {
            if let Some((_, task)) = self.inner.sessions.remove(id) {
                let _ = task.join.await;
                gauge!("cadence_active_sessions").decrement(1.0);
            }
        }

        for result in self.inner.coordinator.recover().await {
            match result {
                Ok(receipt) => debug!(
                    session = %receipt.session_id,
                    credits = receipt.credits_consumed,
                    "session drained"
                ),
                Err(e) => error!(error = %e, "session drain failed"),
            }
        }
    }
}
