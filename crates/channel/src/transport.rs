//! Transport contract to the channel counterparty.

use alloy_primitives::Address;
use cadence_primitives::{AllocationRef, AllocationSplit};

use crate::error::ChannelError;

/// Duplex RPC connection to the channel counterparty network.
///
/// The counterparty's own protocol is out of scope; implementations adapt
/// whatever wire format the network speaks onto these four calls. The
/// connection is process-wide and session-independent:
/// [`authenticate`](ChannelTransport::authenticate) runs exactly once, at
/// service start.
#[async_trait::async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    /// One-time authentication handshake.
    async fn authenticate(&self) -> Result<(), ChannelError>;

    /// Open a two-party allocation funded with `deposit` credits.
    async fn open(
        &self,
        counterparty: Address,
        deposit: u64,
    ) -> Result<AllocationRef, ChannelError>;

    /// Move the allocation to a new split.
    async fn update(
        &self,
        allocation: AllocationRef,
        split: AllocationSplit,
    ) -> Result<(), ChannelError>;

    /// Close the allocation at its final split.
    async fn close(
        &self,
        allocation: AllocationRef,
        split: AllocationSplit,
    ) -> Result<(), ChannelError>;
}
