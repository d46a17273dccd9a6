//! Digests and signing keys shared by the Quiver broker.
//!
//! [`ContentHash`] fingerprints call inputs and outputs for the audit trail
//! and detects drift between a package manifest and its derived tool cache.
//! [`KeyPair`] is the broker's identity: it signs capability tokens and
//! audit records, and verifiers hold only the [`PublicKey`].
//!
//! ```
//! use quiver_crypto::{ContentHash, KeyPair};
//! use serde_json::json;
//!
//! let broker = KeyPair::generate();
//! let signature = broker.sign(b"record");
//! broker.public_key().verify(b"record", &signature).unwrap();
//!
//! let left = ContentHash::of_json(&json!({"b": 1, "a": 2})).unwrap();
//! let right = ContentHash::of_json(&json!({"a": 2, "b": 1})).unwrap();
//! assert_eq!(left, right);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod keypair;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
