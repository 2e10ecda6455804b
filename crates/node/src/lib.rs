//! Engine wiring for the cadence node.
//!
//! [`Engine`] composes the session manager, per-session metering loops,
//! and the settlement coordinator over caller-supplied collaborators, and
//! exposes the surface the (out-of-scope) API layer drives:
//!
//! - `start` / `stop` - session lifecycle plus a stream of meter events
//! - `deposit` / `balance` - the listener credit account
//! - `settle_result` - final accounting for a closed session
//! - `earnings` - creator-facing history view
//! - `shutdown` - drain every live session through settlement
//!
//! Both close paths (client stop, balance exhaustion) funnel through one
//! internal close routine, so the close sequence exists in exactly one
//! place and the status compare-and-swap decides who runs it.

mod builder;
mod engine;
mod error;

pub use builder::EngineBuilder;
pub use engine::{Engine, SettleResult};
pub use error::EngineError;
