//! Package discovery.
//!
//! Scans the immediate subdirectories of a root for `SKILL.md`. A package
//! that fails to load is logged and skipped; it never hides the others.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{PackageError, PackageResult};
use crate::loader;
use crate::manifest::{CapabilityPackage, MANIFEST_FILE_NAME, PackageHeader};

/// Package directories under `root`, sorted by path.
///
/// # Errors
///
/// Returns [`PackageError::Io`] if `root` cannot be listed.
pub fn package_dirs(root: &Path) -> PackageResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root).map_err(|e| PackageError::io(root, e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PackageError::io(root, e))?.path();
        if path.is_dir() && path.join(MANIFEST_FILE_NAME).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Discover package headers under `root` (progressive disclosure).
///
/// # Errors
///
/// Returns an error only if `root` itself cannot be listed.
pub fn discover_headers(root: &Path) -> PackageResult<Vec<PackageHeader>> {
    let mut headers = Vec::new();
    for dir in package_dirs(root)? {
        match loader::load_header(&dir) {
            Ok(header) => {
                debug!(package = %header.name, path = %dir.display(), "discovered package header");
                headers.push(header);
            },
            Err(e) => warn!(path = %dir.display(), error = %e, "skipping invalid package"),
        }
    }
    info!(root = %root.display(), count = headers.len(), "discovered packages");
    Ok(headers)
}

/// Discover and fully load every package under `root`.
///
/// # Errors
///
/// Returns an error only if `root` itself cannot be listed.
pub fn discover_packages(root: &Path) -> PackageResult<Vec<CapabilityPackage>> {
    let mut packages = Vec::new();
    for dir in package_dirs(root)? {
        match loader::load_package(&dir) {
            Ok(package) => packages.push(package),
            Err(e) => warn!(path = %dir.display(), error = %e, "skipping invalid package"),
        }
    }
    info!(root = %root.display(), count = packages.len(), "loaded packages");
    Ok(packages)
}
