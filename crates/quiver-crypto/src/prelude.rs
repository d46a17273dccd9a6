//! `use quiver_crypto::prelude::*;` brings in the key, signature and digest types.

pub use crate::{ContentHash, CryptoError, CryptoResult, KeyPair, PublicKey, Signature};
