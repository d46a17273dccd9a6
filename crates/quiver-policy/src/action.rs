//! Requested actions and policy decisions.

use std::fmt;

use quiver_package::ActionCategory;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// A side effect a sandbox asks the broker to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RequestedAction {
    /// Read a file.
    ReadFile {
        /// Path as requested (absolute or root-relative).
        path: String,
    },
    /// Create or replace a file.
    WriteFile {
        /// Path as requested.
        path: String,
        /// Whether the target already exists.
        overwrite: bool,
    },
    /// Open an outbound connection.
    Connect {
        /// Target URL.
        url: String,
    },
    /// Spawn a process.
    SpawnProcess {
        /// Program name or path.
        program: String,
    },
}

impl RequestedAction {
    /// Safety categories this action falls under, most specific first.
    #[must_use]
    pub fn categories(&self) -> &'static [ActionCategory] {
        match self {
            Self::ReadFile { .. } => &[ActionCategory::FilesystemRead],
            Self::WriteFile {
                overwrite: true, ..
            } => &[
                ActionCategory::DestructiveWrite,
                ActionCategory::FilesystemWrite,
            ],
            Self::WriteFile { .. } => &[ActionCategory::FilesystemWrite],
            Self::Connect { .. } => &[ActionCategory::ExternalNetwork],
            Self::SpawnProcess { .. } => &[ActionCategory::ProcessSpawn],
        }
    }

    /// Short label for logs and audit records.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::ReadFile { path } => format!("read {path}"),
            Self::WriteFile {
                path,
                overwrite: true,
            } => format!("overwrite {path}"),
            Self::WriteFile { path, .. } => format!("write {path}"),
            Self::Connect { url } => format!("connect {url}"),
            Self::SpawnProcess { program } => format!("spawn {program}"),
        }
    }
}

/// Why an action was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DenyReason {
    /// The path resolves outside the execution root.
    EscapesRoot {
        /// Requested path.
        path: String,
    },
    /// The package does not declare a matching permission.
    NotDeclared {
        /// What was asked for.
        target: String,
    },
    /// The package declares it but the external boundary excludes it.
    OutsideBoundary {
        /// What was asked for.
        target: String,
    },
    /// Package grant and boundary share nothing in this category.
    EmptyIntersection {
        /// Affected category.
        category: String,
    },
    /// The URL cannot be parsed or has no host.
    InvalidUrl {
        /// Detail.
        detail: String,
    },
    /// Only `http` and `https` are brokered.
    UnsupportedScheme {
        /// Scheme found.
        scheme: String,
    },
    /// A pattern failed to compile; the engine fails closed.
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EscapesRoot { path } => write!(f, "`{path}` is outside the execution root"),
            Self::NotDeclared { target } => {
                write!(f, "`{target}` is not covered by the package permissions")
            },
            Self::OutsideBoundary { target } => {
                write!(f, "`{target}` is excluded by the host boundary")
            },
            Self::EmptyIntersection { category } => write!(
                f,
                "effective {category} permission is empty (package grant and host boundary do not overlap)"
            ),
            Self::InvalidUrl { detail } => write!(f, "invalid URL: {detail}"),
            Self::UnsupportedScheme { scheme } => {
                write!(f, "scheme `{scheme}` is not allowed; use http or https")
            },
            Self::InvalidPattern { pattern } => write!(f, "pattern `{pattern}` does not compile"),
        }
    }
}

/// Outcome of a permission evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The action is inside the effective permission.
    Grant,
    /// The action is refused.
    Deny {
        /// Why.
        reason: DenyReason,
    },
}

impl Decision {
    pub(crate) fn deny(reason: DenyReason) -> Self {
        Self::Deny { reason }
    }

    /// Whether the action was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Grant)
    }

    /// Convert into a result, mapping denial to [`PolicyError::PermissionDenied`].
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` with the rendered reason on denial.
    pub fn into_result(self) -> PolicyResult<()> {
        match self {
            Self::Grant => Ok(()),
            Self::Deny { reason } => Err(PolicyError::PermissionDenied {
                reason: reason.to_string(),
            }),
        }
    }
}
