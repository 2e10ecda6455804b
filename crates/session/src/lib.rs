//! Session lifecycle and metering.
//!
//! A session is one listen-through of one track. Its life is owned by
//! two cooperating pieces:
//!
//! - [`SessionManager`] - creates, looks up, and closes session rows; the
//!   only place status transitions are initiated from the caller side
//! - [`MeteringLoop`] - one tokio task per open session, debiting one
//!   credit per second of wall clock until stopped, exhausted, or closed
//!
//! The two meet at the session's status byte: `RequestClose` wins the
//! `Open -> Closing` compare-and-swap exactly once, and the loop checks
//! the status at the top of every tick, so metering always stops before
//! settlement starts.

mod error;
mod manager;
mod meter;

pub use error::SessionError;
pub use manager::SessionManager;
pub use meter::{MeterCommand, MeterOutcome, MeteringLoop};
