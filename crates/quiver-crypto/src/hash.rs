//! BLAKE3 digests.
//!
//! Audit records carry digests of call inputs and outputs instead of the
//! payloads, chain to their predecessor by digest, and the package loader
//! compares the derived tool cache with the manifest by digest.

use std::fmt;
use std::str::FromStr;

use hex::FromHex;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// A 32-byte BLAKE3 digest, shown and serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Digest of `data`.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Digest of `data` under a derivation context. Equal data under two
    /// contexts never produces equal digests.
    #[must_use]
    pub fn hash_with_domain(domain: &str, data: &[u8]) -> Self {
        Self(blake3::Hasher::new_derive_key(domain).update(data).finalize().into())
    }

    /// Digest of the RFC 8785 canonical JSON form of `value`; object key
    /// order does not affect the result.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Canonicalization`] for values JSON cannot
    /// represent, such as non-finite floats.
    pub fn of_json<T: Serialize>(value: &T) -> CryptoResult<Self> {
        serde_jcs::to_vec(value)
            .map(|canonical| Self::hash(&canonical))
            .map_err(|e| CryptoError::Canonicalization(e.to_string()))
    }

    /// The all-zero digest a chain starts from.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0; 32])
    }

    /// Whether this is [`Self::zero`].
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ContentHash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <[u8; 32]>::from_hex(s)
            .map(Self)
            .map_err(|e| CryptoError::Decode {
                what: "content hash",
                message: e.to_string(),
            })
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..12).unwrap_or(hex.as_str()))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_domains_separate_digests() {
        assert_eq!(ContentHash::hash(b"call"), ContentHash::hash(b"call"));
        let record = ContentHash::hash_with_domain("quiver audit record v1", b"call");
        let cache = ContentHash::hash_with_domain("quiver tool cache v1", b"call");
        assert_ne!(record, cache);
        assert_ne!(record, ContentHash::hash(b"call"));
    }

    #[test]
    fn test_json_digest_ignores_key_order_only() {
        let a = ContentHash::of_json(&json!({"z": [1, 2], "a": {"y": 1, "x": 2}})).unwrap();
        let b = ContentHash::of_json(&json!({"a": {"x": 2, "y": 1}, "z": [1, 2]})).unwrap();
        let reordered_array = ContentHash::of_json(&json!({"a": {"x": 2, "y": 1}, "z": [2, 1]})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, reordered_array);
    }

    #[test]
    fn test_hex_text_form() {
        let hash = ContentHash::hash(b"x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        assert_eq!(serde_json::from_str::<ContentHash>(&json).unwrap(), hash);
        assert!("abcd".parse::<ContentHash>().is_err());
    }

    #[test]
    fn test_zero_head() {
        assert!(ContentHash::zero().is_zero());
        assert!(ContentHash::default().is_zero());
        assert!(!ContentHash::hash(b"").is_zero());
    }
}
