//! Broker error types.

use thiserror::Error;

/// Errors raised while assembling or configuring a broker.
///
/// Executions never fail with these: every execution outcome is an
/// [`ExecutionResult`](quiver_core::ExecutionResult).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A credential could not be set up.
    #[error("credential `{name}`: {message}")]
    Credential {
        /// Credential name.
        name: String,
        /// What is wrong.
        message: String,
    },

    /// The external boundary is invalid.
    #[error("invalid boundary: {0}")]
    Boundary(#[from] quiver_policy::PolicyError),

    /// The audit log could not be opened.
    #[error("audit error: {0}")]
    Audit(#[from] quiver_audit::AuditError),

    /// The signing key could not be loaded.
    #[error("crypto error: {0}")]
    Crypto(#[from] quiver_crypto::CryptoError),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(String),

    /// Two tool hosts registered under one name.
    #[error("tool host `{0}` is registered twice")]
    DuplicateHost(String),
}

/// Why a presented capability token was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token does not decode.
    #[error("malformed capability token: {0}")]
    Malformed(String),

    /// Signed by a different key.
    #[error("capability token {token_id} was not issued by this broker")]
    UnknownIssuer {
        /// Token identifier.
        token_id: String,
    },

    /// The signature does not match the content.
    #[error("capability token {token_id} has an invalid signature")]
    InvalidSignature {
        /// Token identifier.
        token_id: String,
    },

    /// The token is past its expiry.
    #[error("capability token {token_id} has expired")]
    Expired {
        /// Token identifier.
        token_id: String,
    },

    /// Issued for another request.
    #[error("capability token {token_id} belongs to another request")]
    WrongRequest {
        /// Token identifier.
        token_id: String,
    },

    /// The token does not cover the operation.
    #[error("capability token does not grant {operation} on `{resource}`")]
    OutOfScope {
        /// Operation attempted.
        operation: String,
        /// Resource attempted.
        resource: String,
    },
}

/// Result type for broker setup.
pub type BrokerResult<T> = Result<T, BrokerError>;
