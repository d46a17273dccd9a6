//! Scoped capability tokens.
//!
//! The sandbox never sees a credential. When a request needs something the
//! broker forwards on its behalf (an external tool host, a credentialed
//! network destination) it receives a token instead: signed by the broker,
//! bound to one request, listing the forwarded resources and expiring
//! shortly after issue.
//!
//! A token presented back is checked for issuer, signature, expiry, request
//! and scope. Passing those checks never skips the policy evaluation of the
//! call it accompanies.

use base64::Engine;
use chrono::{TimeDelta, Utc};
use quiver_core::{RequestId, Timestamp};
use quiver_crypto::{KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::TokenError;

/// Clock skew tolerated when checking expiry.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 30;

/// Version byte of the signed encoding.
const SIGNING_DATA_VERSION: u8 = 0x01;

/// One forwarded resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Broker operation (`tool.invoke`, `net.fetch`).
    pub operation: String,
    /// Resource under that operation: a host name or a network entry.
    pub resource: String,
}

impl TokenGrant {
    /// Create a grant.
    #[must_use]
    pub fn new(operation: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
        }
    }
}

/// A signed, request-bound, time-limited description of forwarded resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    /// Token identifier.
    pub id: Uuid,
    /// Request the token was issued for.
    pub request_id: RequestId,
    /// Capability package name.
    pub capability: String,
    /// Forwarded resources.
    pub grants: Vec<TokenGrant>,
    /// Issue time.
    pub issued_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Broker key that signed the token.
    pub issuer: PublicKey,
    /// Signature over [`Self::signing_data`].
    pub signature: Signature,
}

impl CapabilityToken {
    /// Issue and sign a token valid for `ttl`.
    #[must_use]
    pub fn issue(
        key: &KeyPair,
        request_id: RequestId,
        capability: impl Into<String>,
        grants: Vec<TokenGrant>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires = now.checked_add_signed(ttl).unwrap_or(now);

        let mut token = Self {
            id: Uuid::new_v4(),
            request_id,
            capability: capability.into(),
            grants,
            issued_at: Timestamp::from(now),
            expires_at: Timestamp::from(expires),
            issuer: key.public_key(),
            signature: Signature::from_bytes([0u8; 64]),
        };
        token.signature = key.sign(&token.signing_data());
        token
    }

    /// Canonical bytes covered by the signature.
    #[must_use]
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(256);

        data.push(SIGNING_DATA_VERSION);
        write_length_prefixed(&mut data, self.id.as_bytes());
        write_length_prefixed(&mut data, self.request_id.0.as_bytes());
        write_length_prefixed(&mut data, self.capability.as_bytes());

        // Grant count and values
        let count = u32::try_from(self.grants.len()).unwrap_or(u32::MAX);
        data.extend_from_slice(&count.to_le_bytes());
        for grant in &self.grants {
            write_length_prefixed(&mut data, grant.operation.as_bytes());
            write_length_prefixed(&mut data, grant.resource.as_bytes());
        }

        data.extend_from_slice(&self.issued_at.unix_secs().to_le_bytes());
        data.extend_from_slice(&self.expires_at.unix_secs().to_le_bytes());

        // Issuer (fixed 32 bytes)
        data.extend_from_slice(self.issuer.as_bytes());

        data
    }

    /// Whether the token expired more than `skew_secs` ago.
    #[must_use]
    pub fn is_expired_with_skew(&self, skew_secs: i64) -> bool {
        let deadline = TimeDelta::try_seconds(skew_secs)
            .and_then(|skew| self.expires_at.0.checked_add_signed(skew))
            .unwrap_or(self.expires_at.0);
        Utc::now() > deadline
    }

    /// Whether the token lists `operation` on `resource`.
    #[must_use]
    pub fn grants(&self, operation: &str, resource: &str) -> bool {
        self.grants
            .iter()
            .any(|g| g.operation == operation && g.resource == resource)
    }

    /// Check the token for `operation` on `resource` within `request_id`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check: issuer, signature, expiry, request,
    /// then scope.
    pub fn verify(
        &self,
        issuer: &PublicKey,
        request_id: &RequestId,
        operation: &str,
        resource: &str,
    ) -> Result<(), TokenError> {
        let token_id = self.id.to_string();
        if &self.issuer != issuer {
            return Err(TokenError::UnknownIssuer { token_id });
        }
        if issuer.verify(&self.signing_data(), &self.signature).is_err() {
            return Err(TokenError::InvalidSignature { token_id });
        }
        if self.is_expired_with_skew(DEFAULT_CLOCK_SKEW_SECS) {
            return Err(TokenError::Expired { token_id });
        }
        if &self.request_id != request_id {
            return Err(TokenError::WrongRequest { token_id });
        }
        if !self.grants(operation, resource) {
            return Err(TokenError::OutOfScope {
                operation: operation.to_owned(),
                resource: resource.to_owned(),
            });
        }
        Ok(())
    }

    /// Encode for the sandbox environment (URL-safe base64 of the JSON form).
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token produced by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] if the text is not a token.
    pub fn decode(encoded: &str) -> Result<Self, TokenError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}

fn write_length_prefixed(data: &mut Vec<u8>, bytes: &[u8]) {
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(bytes);
}
