//! Custodial settlement service contract and clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, Keccak256};
use parking_lot::Mutex;

use cadence_primitives::TxRef;

use crate::error::SettlementError;

/// External custodial execution service moving value between accounts.
///
/// One call per settled session; the service's own idempotency covers
/// replays after a response was lost.
#[async_trait::async_trait]
pub trait SettlementService: Send + Sync + 'static {
    /// Move `amount` credits of custodial value payer -> payee.
    async fn execute(
        &self,
        payer: Address,
        payee: Address,
        amount: u64,
    ) -> Result<TxRef, SettlementError>;

    /// Human-readable name for logging and debugging.
    fn name(&self) -> &'static str;
}

/// Settlement service as seen by the coordinator.
///
/// `Unconfigured` makes a missing executor observable: settling against
/// it is a permanent failure, never a success with a placeholder
/// transaction reference.
#[derive(Clone)]
pub enum SettlementClient {
    /// No settlement service configured for this process.
    Unconfigured,
    /// A configured execution service.
    Service(Arc<dyn SettlementService>),
}

impl SettlementClient {
    /// True when an execution service is configured.
    pub fn is_configured(&self) -> bool {
        matches!(self, SettlementClient::Service(_))
    }

    /// Execute one transfer.
    pub async fn execute(
        &self,
        payer: Address,
        payee: Address,
        amount: u64,
    ) -> Result<TxRef, SettlementError> {
        match self {
            SettlementClient::Unconfigured => Err(SettlementError::Unconfigured),
            SettlementClient::Service(service) => service.execute(payer, payee, amount).await,
        }
    }
}

/// In-process settlement executor. Dev and testing only: transfers are
/// recorded locally and acknowledged with a deterministic reference, no
/// custodial value moves anywhere.
#[derive(Default)]
pub struct InProcessSettlement {
    executed: Mutex<Vec<(Address, Address, u64)>>,
    seq: AtomicU64,
}

impl InProcessSettlement {
    /// Create an executor with an empty transfer log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfers executed so far, in order.
    pub fn executed(&self) -> Vec<(Address, Address, u64)> {
        self.executed.lock().clone()
    }
}

#[async_trait::async_trait]
impl SettlementService for InProcessSettlement {
    async fn execute(
        &self,
        payer: Address,
        payee: Address,
        amount: u64,
    ) -> Result<TxRef, SettlementError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Keccak256::new();
        hasher.update(payer);
        hasher.update(payee);
        hasher.update(amount.to_le_bytes());
        hasher.update(seq.to_le_bytes());
        let tx = TxRef(hasher.finalize());

        self.executed.lock().push((payer, payee, amount));
        Ok(tx)
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_unconfigured_never_fabricates_success() {
        let client = SettlementClient::Unconfigured;

        assert_matches!(
            client
                .execute(Address::from([1u8; 20]), Address::from([2u8; 20]), 5)
                .await,
            Err(SettlementError::Unconfigured)
        );
    }

    #[tokio::test]
    async fn test_in_process_records_transfers() {
        let service = InProcessSettlement::new();

        let a = service
            .execute(Address::from([1u8; 20]), Address::from([2u8; 20]), 5)
            .await
            .unwrap();
        let b = service
            .execute(Address::from([1u8; 20]), Address::from([2u8; 20]), 5)
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(service.executed().len(), 2);
    }
}
