//! Engine-level error type.

use cadence_session::SessionError;
use cadence_settlement::CloseError;

/// Errors surfaced by the engine facade.
///
/// A thin union over the lifecycle and close taxonomies; callers branch
/// on the inner variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Lifecycle failure (start, lookup, close request).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Close sequence failure (settlement, finalize).
    #[error(transparent)]
    Close(#[from] CloseError),
}
