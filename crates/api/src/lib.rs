//! Collaborator contracts for the cadence streaming payment engine.
//!
//! The engine core talks to every external system through a trait defined
//! here, so the hard parts (metering, close sequencing) stay testable
//! against in-process implementations:
//!
//! - [`LedgerStore`] - the persistent store holding balances, session rows,
//!   stream history, and loyalty grants, exposed as single atomic steps
//! - [`ContentCatalog`] - read-only track lookup consulted at session start
//!
//! The channel peer and settlement service contracts live with their client
//! crates; this crate only carries what several crates share.

mod config;
mod error;
mod events;
mod store;

pub mod constants;

pub use config::{EngineConfig, LoyaltyConfig, MeteringConfig, SettlementConfig};
pub use error::LedgerError;
pub use events::MeterEvent;
pub use store::{ContentCatalog, LedgerStore};
