//! Failures of the audit trail itself.

use thiserror::Error;

/// Why an audit record could not be written, read or trusted.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink refused the write or the read.
    #[error("audit sink: {0}")]
    Sink(String),

    /// A record did not encode to, or decode from, its line form.
    #[error("audit record encoding: {0}")]
    Encoding(String),

    /// The record's signature does not cover its body.
    #[error("record {record_id} is not signed by the broker key")]
    InvalidSignature {
        /// Offending record.
        record_id: String,
    },

    /// Hashing or signing failed.
    #[error(transparent)]
    Crypto(#[from] quiver_crypto::CryptoError),
}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        Self::Sink(e.to_string())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
