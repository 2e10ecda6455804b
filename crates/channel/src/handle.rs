//! Cloneable handle for interacting with the channel service.

use tokio::sync::{mpsc, oneshot};

use alloy_primitives::Address;
use cadence_primitives::{AllocationRef, AllocationSplit};

use crate::error::ChannelError;
use crate::service::ChannelCommand;

/// Cloneable sender for channel commands.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    command_tx: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    /// Create a new handle from a command sender.
    pub fn new(command_tx: mpsc::UnboundedSender<ChannelCommand>) -> Self {
        Self { command_tx }
    }

    /// Open an allocation and wait for the peer's handle to it.
    pub async fn open_allocation(
        &self,
        counterparty: Address,
        deposit: u64,
    ) -> Result<AllocationRef, ChannelError> {
        let (tx, rx) = oneshot::channel();

        self.command_tx
            .send(ChannelCommand::Open {
                counterparty,
                deposit,
                response_tx: tx,
            })
            .map_err(|_| ChannelError::ServiceStopped)?;

        rx.await.map_err(|_| ChannelError::ServiceStopped)?
    }

    /// Enqueue an allocation update without waiting. The tick path calls
    /// this; it must never block on the peer.
    pub fn update_allocation(
        &self,
        allocation: AllocationRef,
        split: AllocationSplit,
    ) -> Result<(), ChannelError> {
        self.command_tx
            .send(ChannelCommand::Update { allocation, split })
            .map_err(|_| ChannelError::ServiceStopped)
    }

    /// Close an allocation and wait for the peer's acknowledgement.
    pub async fn close_allocation(
        &self,
        allocation: AllocationRef,
        split: AllocationSplit,
    ) -> Result<(), ChannelError> {
        let (tx, rx) = oneshot::channel();

        self.command_tx
            .send(ChannelCommand::Close {
                allocation,
                split,
                response_tx: tx,
            })
            .map_err(|_| ChannelError::ServiceStopped)?;

        rx.await.map_err(|_| ChannelError::ServiceStopped)?
    }
}
