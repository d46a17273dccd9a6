//! The broker's signing identity.
//!
//! One key pair per broker process signs every capability token and audit
//! record. The secret half lives only in memory and in a single key file
//! readable by the owner.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::signature::Signature;

const SECRET_LEN: usize = 32;

/// Ed25519 signing key. `SigningKey` wipes its secret on drop.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Fresh key from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a key from its 32 secret bytes.
    ///
    /// # Errors
    ///
    /// [`CryptoError::Length`] when `secret` is not 32 bytes.
    pub fn from_secret(secret: &[u8]) -> CryptoResult<Self> {
        let bytes: Zeroizing<[u8; SECRET_LEN]> =
            Zeroizing::new(secret.try_into().map_err(|_| CryptoError::Length {
                what: "secret key",
                expected: SECRET_LEN,
                actual: secret.len(),
            })?);
        Ok(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    /// Reads the key stored at `path`, creating it on first use.
    ///
    /// A new file is written with mode 0600. An existing path that is a
    /// symlink is refused rather than followed.
    ///
    /// # Errors
    ///
    /// [`CryptoError::KeyFile`] when the file cannot be created or read,
    /// [`CryptoError::Length`] when it holds something other than a key.
    pub fn load_or_generate(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let key_file = |e: io::Error| CryptoError::KeyFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(key_file)?;
        }
        match Self::create(path) {
            Ok(key) => Ok(key),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Self::read_existing(path).map_err(|e| match e {
                    ReadError::Io(e) => key_file(e),
                    ReadError::Symlink => CryptoError::KeyFile {
                        path: path.to_path_buf(),
                        message: "refusing to follow a symlink".to_owned(),
                    },
                    ReadError::Key(e) => e,
                })
            },
            Err(e) => Err(key_file(e)),
        }
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

        let mut file = options.open(path)?;
        let key = Self::generate();
        let secret = Zeroizing::new(key.signing.to_bytes());
        file.write_all(secret.as_slice())?;
        file.sync_all()?;
        Ok(key)
    }

    fn read_existing(path: &Path) -> Result<Self, ReadError> {
        if fs::symlink_metadata(path)
            .map_err(ReadError::Io)?
            .file_type()
            .is_symlink()
        {
            return Err(ReadError::Symlink);
        }
        let secret = Zeroizing::new(fs::read(path).map_err(ReadError::Io)?);
        Self::from_secret(&secret).map_err(ReadError::Key)
    }

    /// Signs `message`.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message).into()
    }

    /// The half that verifiers hold.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.public_key().fingerprint())
    }
}

enum ReadError {
    Io(io::Error),
    Symlink,
    Key(CryptoError),
}

/// An Ed25519 verifying key, serialized as base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight bytes in hex, for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(self.0.get(..8).unwrap_or_default())
    }

    /// Checks `signature` over `message`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidPublicKey`] when the bytes are not a curve
    /// point, [`CryptoError::BadSignature`] when the signature does not match.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        key.verify(message, &signature.to_dalek())
            .map_err(|_| CryptoError::BadSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let text = String::deserialize(deserializer)?;
        let raw = STANDARD.decode(text).map_err(D::Error::custom)?;
        let actual = raw.len();
        <[u8; 32]>::try_from(raw).map(Self).map_err(|_| {
            D::Error::custom(CryptoError::Length {
                what: "public key",
                expected: 32,
                actual,
            })
        })
    }
}
