//! Selection error types.

use thiserror::Error;

/// Errors raised by the selection engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The caller named a capability that is not among the candidates.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),
}

/// Result type for selection.
pub type SelectionResult<T> = Result<T, SelectionError>;
