//! Payment channel peer client.
//!
//! The channel network mirrors ledger debits into an off-chain two-party
//! allocation so the counterparty sees consumption with low latency. It is
//! **advisory**: the ledger debit is the authoritative record, and every
//! failure here degrades to "no acceleration", never to a wrong balance.
//!
//! # Components
//!
//! - [`ChannelTransport`] - the opaque duplex RPC to the counterparty,
//!   authenticated once at process start
//! - [`ChannelService`] - actor owning the transport, one per process
//! - [`ChannelHandle`] - cloneable sender used by session paths
//! - [`ChannelClient`] - handle plus an explicit `Unconfigured` state, so
//!   a missing channel network is a typed, observable condition instead of
//!   a fabricated success

mod error;
mod handle;
mod service;
mod transport;

pub use error::ChannelError;
pub use handle::ChannelHandle;
pub use service::{ChannelCommand, ChannelService};
pub use transport::ChannelTransport;

use alloy_primitives::Address;
use cadence_primitives::{AllocationRef, AllocationSplit};

/// Channel peer client as seen by the session paths.
///
/// `Unconfigured` is a deliberate state, not an error case hidden behind
/// an `Option`: call sites decide per operation whether a missing channel
/// network means "skip quietly" (metering, advisory) or "log and move on"
/// (close phase 1).
#[derive(Clone)]
pub enum ChannelClient {
    /// No channel network configured for this process.
    Unconfigured,
    /// Connected and authenticated.
    Connected(ChannelHandle),
}

impl ChannelClient {
    /// True when a channel network is configured.
    pub fn is_configured(&self) -> bool {
        matches!(self, ChannelClient::Connected(_))
    }

    /// Open an allocation against a counterparty with the given deposit.
    pub async fn open_allocation(
        &self,
        counterparty: Address,
        deposit: u64,
    ) -> Result<AllocationRef, ChannelError> {
        match self {
            ChannelClient::Unconfigured => Err(ChannelError::Unconfigured),
            ChannelClient::Connected(handle) => handle.open_allocation(counterparty, deposit).await,
        }
    }

    /// Enqueue an allocation update, fire-and-forget. Never blocks; an
    /// error only means the update was not even enqueued.
    pub fn update_allocation(
        &self,
        allocation: AllocationRef,
        split: AllocationSplit,
    ) -> Result<(), ChannelError> {
        match self {
            ChannelClient::Unconfigured => Err(ChannelError::Unconfigured),
            ChannelClient::Connected(handle) => handle.update_allocation(allocation, split),
        }
    }

    /// Close an allocation with its final split.
    pub async fn close_allocation(
        &self,
        allocation: AllocationRef,
        split: AllocationSplit,
    ) -> Result<(), ChannelError> {
        match self {
            ChannelClient::Unconfigured => Err(ChannelError::Unconfigured),
            ChannelClient::Connected(handle) => handle.close_allocation(allocation, split).await,
        }
    }
}
