//! Channel service actor (runs in its own tokio task).

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use alloy_primitives::Address;
use cadence_primitives::{AllocationRef, AllocationSplit};

use crate::error::ChannelError;
use crate::handle::ChannelHandle;
use crate::transport::ChannelTransport;

/// Commands from handles to the service.
pub enum ChannelCommand {
    /// Open an allocation against a counterparty.
    Open {
        /// The creator-side account of the allocation.
        counterparty: Address,
        /// Credits funding the listener side.
        deposit: u64,
        /// Channel to send the result.
        response_tx: oneshot::Sender<Result<AllocationRef, ChannelError>>,
    },
    /// Move an allocation to a new split. Fire-and-forget: no response,
    /// zero retries, failures are logged and dropped.
    Update {
        /// The allocation to move.
        allocation: AllocationRef,
        /// The new split.
        split: AllocationSplit,
    },
    /// Close an allocation at its final split.
    Close {
        /// The allocation to close.
        allocation: AllocationRef,
        /// The final split.
        split: AllocationSplit,
        /// Channel to send the result.
        response_tx: oneshot::Sender<Result<(), ChannelError>>,
    },
}

/// Processes channel commands against the transport, one at a time.
///
/// Owning the transport in a single task keeps the duplex connection free
/// of interleaved writes; session paths never touch it directly.
#[derive(Debug)]
pub struct ChannelService<T> {
    command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    transport: T,
}

impl<T: ChannelTransport> ChannelService<T> {
    /// Authenticate against the counterparty and return the service with
    /// a handle to it. The handshake runs exactly once per process, here.
    pub async fn connect(transport: T) -> Result<(Self, ChannelHandle), ChannelError> {
        transport.authenticate().await?;
        debug!("channel peer authenticated");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                command_rx,
                transport,
            },
            ChannelHandle::new(command_tx),
        ))
    }

    /// Run the service loop until all handles are dropped.
    pub async fn run(mut self) {
        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;
        }
        debug!("channel service shutting down");
    }

    /// Convert self into a spawnable future.
    pub async fn into_task(self) {
        self.run().await;
    }

    async fn handle_command(&mut self, cmd: ChannelCommand) {
        match cmd {
            ChannelCommand::Open {
                counterparty,
                deposit,
                response_tx,
            } => {
                let result = self.transport.open(counterparty, deposit).await;
                if let Ok(allocation) = &result {
                    debug!(%counterparty, deposit, %allocation, "allocation opened");
                }
                let _ = response_tx.send(result);
            }
            ChannelCommand::Update { allocation, split } => {
                // Best-effort: the ledger already holds the authoritative
                // debit, a missed mirror update costs nothing but latency.
                if let Err(e) = self.transport.update(allocation, split).await {
                    debug!(%allocation, error = %e, "allocation update dropped");
                }
            }
            ChannelCommand::Close {
                allocation,
                split,
                response_tx,
            } => {
                let result = self.transport.close(allocation, split).await;
                if let Err(e) = &result {
                    warn!(%allocation, error = %e, "allocation close failed");
                }
                let _ = response_tx.send(result);
            }
        }
    }
}
