//! Errors raised while hashing, signing or loading keys.

use std::path::PathBuf;

use thiserror::Error;

/// A digest, signature or key could not be produced or checked.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Raw key or signature material has the wrong size.
    #[error("{what} must be {expected} bytes, got {actual}")]
    Length {
        /// `secret key`, `public key` or `signature`.
        what: &'static str,
        /// Required size.
        expected: usize,
        /// Size found.
        actual: usize,
    },

    /// The bytes are not a point on the curve.
    #[error("not an Ed25519 public key: {0}")]
    InvalidPublicKey(String),

    /// The signature does not match the message and key.
    #[error("signature does not verify")]
    BadSignature,

    /// Hex or base64 text failed to decode.
    #[error("cannot decode {what}: {message}")]
    Decode {
        /// What was being decoded.
        what: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The value has no RFC 8785 canonical form.
    #[error("no canonical JSON form: {0}")]
    Canonicalization(String),

    /// The broker key file could not be created or read.
    #[error("key file {}: {message}", path.display())]
    KeyFile {
        /// Key file location.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

/// Result alias for this crate.
pub type CryptoResult<T> = Result<T, CryptoError>;
