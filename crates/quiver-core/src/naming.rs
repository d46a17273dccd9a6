//! The naming rule shared by capability packages and tools.
//!
//! A valid name is 1 to 64 characters of lowercase ASCII letters, digits and
//! hyphens, with no leading, trailing or consecutive hyphens.

use thiserror::Error;

/// Maximum length of a package or tool name.
pub const MAX_NAME_LEN: usize = 64;

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name is empty.
    #[error("name must not be empty")]
    Empty,
    /// The name is longer than [`MAX_NAME_LEN`].
    #[error("name is {len} characters, maximum is {MAX_NAME_LEN}")]
    TooLong {
        /// Actual length in characters.
        len: usize,
    },
    /// The name contains a character outside `[a-z0-9-]`.
    #[error("invalid character {ch:?}; only lowercase letters, digits and hyphens are allowed")]
    InvalidCharacter {
        /// The offending character.
        ch: char,
    },
    /// The name starts or ends with a hyphen.
    #[error("name must not start or end with a hyphen")]
    EdgeHyphen,
    /// The name contains `--`.
    #[error("name must not contain consecutive hyphens")]
    ConsecutiveHyphens,
}

/// Validate a package or tool name.
///
/// # Errors
///
/// Returns the first [`NameError`] the name violates.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(NameError::TooLong { len });
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(NameError::InvalidCharacter { ch });
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(NameError::EdgeHyphen);
    }
    if name.contains("--") {
        return Err(NameError::ConsecutiveHyphens);
    }
    Ok(())
}
