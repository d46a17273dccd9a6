#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Capability packages for the Quiver runtime.
//!
//! This crate provides:
//! - `SKILL.md` parsing and schema-versioned validation
//! - Explicit migration of legacy manifests
//! - Tool source resolution (manifest, cache artifact, external catalogs)
//! - Deterministic regeneration of the `tools.json` cache and drift checks
//! - Package discovery with header-only loading
//! - Host bindings that export tools in each host's format
//!
//! # Example
//!
//! ```rust,no_run
//! use quiver_package::{check_cache, load_package};
//! use std::path::Path;
//!
//! let package = load_package(Path::new("skills/pdf-tools")).unwrap();
//! println!("{} exposes {} tools", package.name(), package.tools.len());
//! println!("{:?}", check_cache(Path::new("skills/pdf-tools")).unwrap());
//! ```

pub mod prelude;

pub mod binding;
pub mod cache;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod migrate;
pub mod network;
pub mod parser;
pub mod resolver;
pub mod schema;

pub use binding::{AnthropicBinding, McpBinding, OpenAiBinding, ToolHostBinding, binding_for};
pub use cache::{CacheStatus, cache_status, check_cache, render_cache, write_cache};
pub use discovery::{discover_headers, discover_packages};
pub use error::{ManifestErrorKind, ManifestValidationError, PackageError, PackageResult};
pub use loader::{load_header, load_package, load_package_with};
pub use manifest::{
    ActionCategory, CapabilityPackage, Confirmation, ConfirmationLevel, EvaluationExample,
    ImplementationBinding, MANIFEST_FILE_NAME, Manifest, PackageHeader, PermissionSet,
    RuntimeKind, SafetyPolicy, SelectionTrigger, ToolDefinition,
};
pub use network::NetworkEntry;
pub use parser::{parse_header, parse_manifest, parse_package};
pub use resolver::{
    CACHE_FILE_NAME, CacheFile, ConflictReason, Resolution, ToolCatalog, ToolSource,
    ToolSourceConflict, resolve,
};
