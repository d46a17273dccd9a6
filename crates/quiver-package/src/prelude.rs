//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_package::prelude::*;` to import all essential types.

// Package model
pub use crate::{
    ActionCategory, CapabilityPackage, ConfirmationLevel, PackageHeader, PermissionSet,
    RuntimeKind, SafetyPolicy, SelectionTrigger, ToolDefinition,
};

// Loading
pub use crate::{discover_headers, discover_packages, load_header, load_package};

// Errors
pub use crate::{ManifestErrorKind, ManifestValidationError, PackageError, PackageResult};

// Resolution
pub use crate::{CacheStatus, ToolCatalog, ToolHostBinding, ToolSourceConflict};
