//! Policy error types.

use quiver_package::ActionCategory;
use thiserror::Error;

/// Errors raised by the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The action is not covered by the effective permission. Terminal.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Why the action was denied.
        reason: String,
    },

    /// The action is permitted but needs an explicit approval first.
    #[error("confirmation required for {category}")]
    ConfirmationRequired {
        /// Gated category.
        category: ActionCategory,
    },

    /// A boundary pattern does not compile.
    #[error("invalid boundary pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// The execution root is not an absolute path.
    #[error("execution root must be absolute: {0}")]
    InvalidRoot(String),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
