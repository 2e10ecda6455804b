//! Custodial settlement and the close sequence.
//!
//! When a session leaves metering, this crate closes it out in three
//! phases:
//!
//! 1. **Channel close** - advisory; skipped on any failure
//! 2. **Custodial settlement** - authoritative; transient failures retry
//!    with jittered exponential backoff, permanent failures dispute the
//!    session
//! 3. **Ledger finalize** - idempotent; history append, status flip,
//!    loyalty check
//!
//! # Components
//!
//! - [`SettlementService`] - contract to the external custodial executor
//! - [`SettlementClient`] - service handle plus a typed `Unconfigured`
//!   state (a missing executor is a permanent failure, never a simulated
//!   success)
//! - [`RetryPolicy`] - bounded jittered exponential backoff
//! - [`SettlementCoordinator`] - runs the three phases exactly once per
//!   session, plus the recovery pass used at shutdown

mod backoff;
mod client;
mod coordinator;
mod error;

pub use backoff::RetryPolicy;
pub use client::{InProcessSettlement, SettlementClient, SettlementService};
pub use coordinator::{CloseReceipt, SettlementCoordinator};
pub use error::{CloseError, SettlementError};
