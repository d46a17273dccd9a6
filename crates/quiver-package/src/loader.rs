//! Loading packages from disk.

use std::path::Path;

use tracing::debug;

use crate::error::{ManifestValidationError, PackageError, PackageResult};
use crate::manifest::{CapabilityPackage, MANIFEST_FILE_NAME, Manifest, PackageHeader};
use crate::parser;
use crate::resolver::{self, CACHE_FILE_NAME, CacheFile, Resolution, ToolCatalog};

/// Largest manifest or cache file accepted (1 MB).
const MAX_PACKAGE_FILE_SIZE: u64 = 1_048_576;

fn read_capped(path: &Path) -> PackageResult<Option<Vec<u8>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PackageError::io(path, e)),
    };
    if bytes.len() as u64 > MAX_PACKAGE_FILE_SIZE {
        return Err(PackageError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("file exceeds {MAX_PACKAGE_FILE_SIZE} bytes"),
            ),
        ));
    }
    Ok(Some(bytes))
}

fn manifest_text(dir: &Path) -> PackageResult<String> {
    let path = dir.join(MANIFEST_FILE_NAME);
    let Some(bytes) = read_capped(&path)? else {
        return Err(PackageError::io(
            &path,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    };
    String::from_utf8(bytes).map_err(|e| PackageError::Manifest {
        path: dir.to_path_buf(),
        source: ManifestValidationError::malformed(
            "frontmatter",
            format!("manifest is not UTF-8: {e}"),
        ),
    })
}

fn invalid(dir: &Path, source: ManifestValidationError) -> PackageError {
    PackageError::Manifest {
        path: dir.to_path_buf(),
        source,
    }
}

/// Read and validate the manifest of the package in `dir`.
///
/// # Errors
///
/// Returns [`PackageError::Io`] if `SKILL.md` is unreadable and
/// [`PackageError::Manifest`] if it fails validation.
pub fn read_manifest(dir: &Path) -> PackageResult<(Manifest, String)> {
    let text = manifest_text(dir)?;
    let (manifest, body) = parser::parse_manifest(&text).map_err(|e| invalid(dir, e))?;
    parser::check_directory_name(&manifest.name, dir).map_err(|e| invalid(dir, e))?;
    Ok((manifest, body))
}

/// Read the cache artifact of the package in `dir`.
///
/// # Errors
///
/// Returns [`PackageError::Io`] for read failures other than absence.
pub fn read_cache(dir: &Path) -> PackageResult<CacheFile> {
    Ok(match read_capped(&dir.join(CACHE_FILE_NAME))? {
        None => CacheFile::Missing,
        Some(bytes) => CacheFile::from_bytes(&bytes),
    })
}

/// Load only the identity-level view of the package in `dir`.
///
/// # Errors
///
/// Returns an error if the manifest is unreadable or its identity fields are
/// invalid.
pub fn load_header(dir: &Path) -> PackageResult<PackageHeader> {
    let text = manifest_text(dir)?;
    let mut header = parser::parse_header(&text).map_err(|e| invalid(dir, e))?;
    parser::check_directory_name(&header.name, dir).map_err(|e| invalid(dir, e))?;
    header.root = Some(dir.to_path_buf());
    Ok(header)
}

/// Load the full package in `dir`, resolving tools against its cache.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or unreadable, or a declared
/// script is missing or resolves outside the package.
pub fn load_package(dir: &Path) -> PackageResult<CapabilityPackage> {
    load_package_with(dir, &[]).map(|(package, _)| package)
}

/// Load the full package in `dir` with external catalogs as the lowest
/// precedence tool source.
///
/// # Errors
///
/// See [`load_package`].
pub fn load_package_with(
    dir: &Path,
    catalogs: &[&dyn ToolCatalog],
) -> PackageResult<(CapabilityPackage, Resolution)> {
    let (manifest, instructions) = read_manifest(dir)?;
    check_scripts_exist(dir, &manifest)?;

    let cache = read_cache(dir)?;
    let resolution = resolver::resolve(&manifest, &cache, catalogs);
    debug!(
        package = %manifest.name,
        tools = resolution.tools.len(),
        conflicts = resolution.conflicts.len(),
        "loaded package"
    );

    let package = CapabilityPackage {
        tools: resolution.definitions(),
        manifest,
        instructions,
        root: dir.to_path_buf(),
    };
    Ok((package, resolution))
}

/// Every declared entrypoint and cleanup script must be a regular file that
/// stays inside the package once symlinks are resolved.
fn check_scripts_exist(dir: &Path, manifest: &Manifest) -> PackageResult<()> {
    let root = dir.canonicalize().map_err(|e| PackageError::io(dir, e))?;
    for (i, tool) in manifest.declared_tools().iter().enumerate() {
        let binding = &tool.implementation;
        for (field, script) in [
            ("entrypoint", Some(&binding.entrypoint)),
            ("cleanup", binding.cleanup.as_ref()),
        ] {
            let Some(script) = script else { continue };
            let field = format!("tools[{i}].implementation.{field}");
            let resolved = dir.join(script).canonicalize().map_err(|_| {
                invalid(
                    dir,
                    ManifestValidationError::pattern(
                        field.clone(),
                        format!("`{script}` does not exist in the package"),
                    ),
                )
            })?;
            if !resolved.starts_with(&root) || !resolved.is_file() {
                return Err(invalid(
                    dir,
                    ManifestValidationError::pattern(
                        field,
                        format!("`{script}` must be a file inside the package"),
                    ),
                ));
            }
        }
    }
    Ok(())
}
