//! Per-session metering loop.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use cadence_api::{LedgerError, LedgerStore, MeterEvent, MeteringConfig};
use cadence_channel::ChannelClient;
use cadence_primitives::{AllocationRef, AllocationSplit, Session};

/// Control messages into a running metering loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterCommand {
    /// Stop metering; the sender runs the close sequence.
    Stop,
}

/// Why a metering loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterOutcome {
    /// A stop command arrived; whoever sent it owns the close.
    Stopped,
    /// The listener's balance hit zero; the loop's owner runs the close.
    Exhausted,
    /// The status barrier was observed at a tick boundary; the party
    /// that swapped the status owns the close.
    Closed,
}

enum TickResult {
    Continue,
    Exhausted,
    Closed,
}

/// One metering loop per open session: one debit per elapsed second.
///
/// The loop is the only writer of this session's consumption counter.
/// Each tick is committed in full before the next one starts, so the
/// counter always equals the number of successful debits. External calls
/// on the tick path are either fire-and-forget (channel update) or
/// bounded by a timeout shorter than the tick period (channel open), so
/// no peer can stall the clock.
pub struct MeteringLoop<L> {
    session: Session,
    ledger: Arc<L>,
    channel: ChannelClient,
    config: MeteringConfig,
    events_tx: mpsc::UnboundedSender<MeterEvent>,
    control_rx: mpsc::UnboundedReceiver<MeterCommand>,
}

impl<L: LedgerStore> MeteringLoop<L> {
    /// Create a loop for a freshly started session.
    pub fn new(
        session: Session,
        ledger: Arc<L>,
        channel: ChannelClient,
        config: MeteringConfig,
        events_tx: mpsc::UnboundedSender<MeterEvent>,
        control_rx: mpsc::UnboundedReceiver<MeterCommand>,
    ) -> Self {
        Self {
            session,
            ledger,
            channel,
            config,
            events_tx,
            control_rx,
        }
    }

    /// Run until stopped, exhausted, or closed from outside.
    pub async fn run(mut self) -> MeterOutcome {
        let allocation = self.open_channel().await;

        // Monotonic schedule: a delayed tick fires late once and skips,
        // it never bunches up into a double charge for one second.
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.config.tick_period,
            self.config.tick_period,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.tick(allocation) {
                    TickResult::Continue => {}
                    TickResult::Exhausted => return MeterOutcome::Exhausted,
                    TickResult::Closed => return MeterOutcome::Closed,
                },
                _ = self.control_rx.recv() => {
                    debug!(session = %self.session.session_id, "metering stopped");
                    return MeterOutcome::Stopped;
                }
            }
        }
    }

    /// Best-effort channel open at loop startup, funded with the
    /// listener's current balance. Any failure means metering proceeds
    /// without channel acceleration.
    async fn open_channel(&self) -> Option<AllocationRef> {
        if !self.channel.is_configured() {
            return None;
        }

        let deposit = self.ledger.balance(self.session.listener_id);
        let open = self
            .channel
            .open_allocation(self.session.creator_id, deposit);
        match tokio::time::timeout(self.config.channel_call_timeout, open).await {
            Ok(Ok(allocation)) => {
                let _ = self.ledger.set_channel_ref(self.session.session_id, allocation);
                debug!(
                    session = %self.session.session_id,
                    %allocation,
                    deposit,
                    "channel allocation opened"
                );
                Some(allocation)
            }
            Ok(Err(e)) => {
                warn!(
                    session = %self.session.session_id,
                    error = %e,
                    "channel open failed, metering without channel"
                );
                None
            }
            Err(_) => {
                warn!(
                    session = %self.session.session_id,
                    "channel open timed out, metering without channel"
                );
                None
            }
        }
    }

    fn tick(&self, allocation: Option<AllocationRef>) -> TickResult {
        let session_id = self.session.session_id;

        // Barrier: stop the instant the status leaves Open, before any
        // debit for this second.
        match self.ledger.session_status(session_id) {
            Some(status) if status.is_open() => {}
            _ => return TickResult::Closed,
        }

        // Authoritative debit for this second of playback.
        let remaining = match self.ledger.try_debit(self.session.listener_id, 1) {
            Ok(balance) => balance,
            Err(LedgerError::InsufficientFunds { .. }) => {
                debug!(session = %session_id, "balance exhausted");
                let _ = self.events_tx.send(MeterEvent::Exhausted);
                return TickResult::Exhausted;
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "debit failed, stopping meter");
                return TickResult::Closed;
            }
        };

        let consumed = match self.ledger.add_consumed(session_id, 1) {
            Ok(total) => total,
            Err(_) => {
                // The close barrier won between debit and record; give the
                // credit back so the ledger matches the recorded total.
                self.ledger.deposit(self.session.listener_id, 1);
                return TickResult::Closed;
            }
        };

        counter!("cadence_meter_ticks_total").increment(1);

        // Advisory mirror into the channel: zero retries, never blocks.
        if let Some(allocation) = allocation {
            let split = AllocationSplit {
                listener_remaining: remaining,
                creator_earned: consumed,
            };
            if let Err(e) = self.channel.update_allocation(allocation, split) {
                debug!(session = %session_id, error = %e, "channel update skipped");
            }
        }

        let _ = self.events_tx.send(MeterEvent::Progress {
            seconds_played: consumed,
            credits_remaining: remaining,
            total_consumed: consumed,
        });
        TickResult::Continue
    }
}
