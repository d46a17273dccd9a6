//! Host-imposed permission boundary.

use std::path::PathBuf;

use globset::GlobBuilder;
use quiver_package::NetworkEntry;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// The boundary a host places around every package it runs.
///
/// Each category is either unrestricted (`None`), leaving the package's own
/// declaration as the only limit, or an allow-list the declaration is
/// intersected with. A boundary can only narrow; it never widens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBoundary {
    /// Absolute execution root that sandbox paths resolve against.
    pub root: PathBuf,
    /// Readable root-relative globs.
    #[serde(default)]
    pub fs_read: Option<Vec<String>>,
    /// Writable root-relative globs.
    #[serde(default)]
    pub fs_write: Option<Vec<String>>,
    /// Network allow-entries.
    #[serde(default)]
    pub network: Option<Vec<String>>,
    /// Whether processes may be spawned.
    #[serde(default)]
    pub process_spawn: Option<bool>,
}

impl ExternalBoundary {
    /// A boundary that restricts nothing beyond the execution root.
    #[must_use]
    pub fn unrestricted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fs_read: None,
            fs_write: None,
            network: None,
            process_spawn: None,
        }
    }

    /// Restrict readable paths.
    #[must_use]
    pub fn with_fs_read<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fs_read = Some(globs.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict writable paths.
    #[must_use]
    pub fn with_fs_write<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fs_write = Some(globs.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict network destinations.
    #[must_use]
    pub fn with_network<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    /// Allow or forbid process spawning.
    #[must_use]
    pub fn with_process_spawn(mut self, allowed: bool) -> Self {
        self.process_spawn = Some(allowed);
        self
    }

    /// Check the root and every pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRoot`] or [`PolicyError::InvalidPattern`].
    pub fn validate(&self) -> PolicyResult<()> {
        if !self.root.is_absolute() {
            return Err(PolicyError::InvalidRoot(self.root.display().to_string()));
        }
        for pattern in self.fs_read.iter().chain(self.fs_write.iter()).flatten() {
            if pattern.starts_with('!') {
                return Err(PolicyError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: "negation patterns are not supported".to_owned(),
                });
            }
            GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| PolicyError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
        }
        for entry in self.network.iter().flatten() {
            NetworkEntry::parse(entry).map_err(|message| PolicyError::InvalidPattern {
                pattern: entry.clone(),
                message,
            })?;
        }
        Ok(())
    }
}
