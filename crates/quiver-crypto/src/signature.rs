//! Detached Ed25519 signatures.
//!
//! Signatures travel inside capability tokens and audit records as
//! standard base64 text.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

const SIGNATURE_LEN: usize = 64;

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Wraps raw signature bytes without checking them.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub(crate) fn to_dalek(self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

impl From<ed25519_dalek::Signature> for Signature {
    fn from(signature: ed25519_dalek::Signature) -> Self {
        Self(signature.to_bytes())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.0.get(..6).unwrap_or_default();
        write!(f, "Signature({}..)", hex::encode(head))
    }
}

impl FromStr for Signature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = STANDARD.decode(s).map_err(|e| CryptoError::Decode {
            what: "signature",
            message: e.to_string(),
        })?;
        let actual = raw.len();
        <[u8; SIGNATURE_LEN]>::try_from(raw)
            .map(Self)
            .map_err(|_| CryptoError::Length {
                what: "signature",
                expected: SIGNATURE_LEN,
                actual,
            })
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn test_text_form_parses_back() {
        let signature = KeyPair::generate().sign(b"record");
        let text = signature.to_string();
        assert_eq!(text.parse::<Signature>().unwrap(), signature);

        let json = serde_json::to_string(&signature).unwrap();
        assert_eq!(json, format!("\"{text}\""));
    }

    #[test]
    fn test_short_signature_rejected() {
        let short = STANDARD.encode([7u8; 10]);
        let err = short.parse::<Signature>().unwrap_err();
        assert!(matches!(
            err,
            CryptoError::Length {
                what: "signature",
                expected: 64,
                actual: 10
            }
        ));
        assert!("not base64!".parse::<Signature>().is_err());
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let debug = format!("{:?}", Signature::from_bytes([0xab; 64]));
        assert_eq!(debug, "Signature(abababababab..)");
    }
}
