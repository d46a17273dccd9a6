//! Derived tool cache artifact.
//!
//! `tools.json` is a read-through cache regenerated from the manifest. It is
//! never a second source of truth: [`check_cache`] compares its structural
//! hash against a fresh rendering and reports drift.

use std::path::{Path, PathBuf};

use quiver_crypto::ContentHash;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PackageError, PackageResult};
use crate::loader::{read_cache, read_manifest};
use crate::manifest::Manifest;
use crate::resolver::{self, CACHE_FILE_NAME, CacheFile, ConflictReason, ToolSource, ToolSourceConflict};

/// Drift status of a package's cache artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CacheStatus {
    /// No artifact on disk.
    Missing,
    /// The artifact matches the manifest.
    Fresh,
    /// The artifact disagrees with the manifest.
    Stale {
        /// Entries that disagree.
        conflicts: Vec<ToolSourceConflict>,
    },
    /// The manifest declares no `tools`, so the artifact is the only tool
    /// source and cannot be regenerated.
    Unmanaged,
}

/// Render the cache artifact for a manifest.
///
/// The output is RFC 8785 canonical JSON followed by a newline, so the same
/// manifest always produces byte-identical output.
///
/// # Errors
///
/// Returns [`PackageError::CacheRender`] if a schema contains values that
/// have no canonical form.
pub fn render_cache(manifest: &Manifest) -> PackageResult<Vec<u8>> {
    let mut bytes = serde_jcs::to_vec(manifest.declared_tools())
        .map_err(|e| PackageError::CacheRender(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Compare a manifest against cache contents.
#[must_use]
pub fn cache_status(manifest: &Manifest, cache: &CacheFile) -> CacheStatus {
    if manifest.tools.is_none() {
        return match cache {
            CacheFile::Missing => CacheStatus::Missing,
            _ => CacheStatus::Unmanaged,
        };
    }
    let entries = match cache {
        CacheFile::Missing => return CacheStatus::Missing,
        CacheFile::Malformed(detail) => {
            return CacheStatus::Stale {
                conflicts: vec![ToolSourceConflict {
                    tool: CACHE_FILE_NAME.to_owned(),
                    source: ToolSource::Cache,
                    reason: ConflictReason::Invalid(detail.clone()),
                }],
            };
        },
        CacheFile::Entries(entries) => entries,
    };

    let expected = ContentHash::of_json(&manifest.declared_tools()).ok();
    let actual = ContentHash::of_json(entries).ok();
    if expected.is_some() && expected == actual {
        return CacheStatus::Fresh;
    }

    let mut conflicts = resolver::resolve(manifest, cache, &[]).conflicts;
    conflicts.extend(resolver::missing_from_cache(manifest, cache));
    if conflicts.is_empty() {
        // Same entries, different order.
        conflicts.push(ToolSourceConflict {
            tool: CACHE_FILE_NAME.to_owned(),
            source: ToolSource::Cache,
            reason: ConflictReason::Invalid("entries are out of order".to_owned()),
        });
    }
    CacheStatus::Stale { conflicts }
}

/// Check the cache artifact of the package in `dir`.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or a file cannot be read.
pub fn check_cache(dir: &Path) -> PackageResult<CacheStatus> {
    let (manifest, _) = read_manifest(dir)?;
    let cache = read_cache(dir)?;
    let status = cache_status(&manifest, &cache);
    debug!(package = %manifest.name, ?status, "checked tool cache");
    Ok(status)
}

/// Regenerate the cache artifact of the package in `dir`.
///
/// Writes atomically through a temporary file in the same directory.
/// Returns the artifact path when a write happened; `None` when the file is
/// already up to date or the manifest declares no tools.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or the write fails.
pub fn write_cache(dir: &Path) -> PackageResult<Option<PathBuf>> {
    let (manifest, _) = read_manifest(dir)?;
    if manifest.tools.is_none() {
        debug!(package = %manifest.name, "manifest declares no tools; cache left alone");
        return Ok(None);
    }
    let bytes = render_cache(&manifest)?;
    let target = dir.join(CACHE_FILE_NAME);

    if std::fs::read(&target).is_ok_and(|existing| existing == bytes) {
        return Ok(None);
    }

    let tmp = dir.join(format!(".{CACHE_FILE_NAME}.{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, &bytes).map_err(|e| PackageError::io(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &target) {
        let _ = std::fs::remove_file(&tmp);
        return Err(PackageError::io(&target, e));
    }
    info!(package = %manifest.name, path = %target.display(), "wrote tool cache");
    Ok(Some(target))
}
