//! Package error types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a manifest validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestErrorKind {
    /// A required field is absent or empty.
    MissingRequiredField,
    /// A field is present but its value breaks a pattern rule.
    PatternMismatch,
    /// The manifest is not shaped like a manifest at all.
    MalformedStructure,
    /// `spec_version` names a schema this runtime does not know.
    UnknownSchemaVersion,
}

impl ManifestErrorKind {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "missing-required-field",
            Self::PatternMismatch => "pattern-mismatch",
            Self::MalformedStructure => "malformed-structure",
            Self::UnknownSchemaVersion => "unknown-schema-version",
        }
    }
}

impl fmt::Display for ManifestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manifest was rejected. Nothing from it is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} at `{field}`: {message}")]
pub struct ManifestValidationError {
    /// Failure category.
    pub kind: ManifestErrorKind,
    /// Dotted path of the offending field (`tools[1].implementation.entrypoint`).
    pub field: String,
    /// Human-readable detail.
    pub message: String,
}

impl ManifestValidationError {
    /// Build an error of `kind` at `field`.
    #[must_use]
    pub fn new(kind: ManifestErrorKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("required field `{field}` is missing or empty");
        Self::new(ManifestErrorKind::MissingRequiredField, field, message)
    }

    pub(crate) fn pattern(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ManifestErrorKind::PatternMismatch, field, message)
    }

    pub(crate) fn malformed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ManifestErrorKind::MalformedStructure, field, message)
    }
}

/// Errors raised while loading packages from disk.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The manifest failed validation.
    #[error("invalid manifest in {path}: {source}")]
    Manifest {
        /// Package directory.
        path: PathBuf,
        /// Validation failure.
        source: ManifestValidationError,
    },

    /// A file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The tool cache could not be rendered.
    #[error("failed to render tool cache: {0}")]
    CacheRender(String),
}

impl PackageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The validation error, if this is a manifest failure.
    #[must_use]
    pub fn manifest_error(&self) -> Option<&ManifestValidationError> {
        match self {
            Self::Manifest { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;
