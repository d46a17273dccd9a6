//! Quiver Test - Shared test utilities for the Quiver runtime.
//!
//! This crate provides package fixtures and mock collaborators that can be
//! used across multiple Quiver crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! quiver-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! #[cfg(test)]
//! mod tests {
//!     use quiver_test::{PackageFixture, ToolFixture, result_script};
//!     use serde_json::json;
//!
//!     #[test]
//!     fn test_package_loads() {
//!         let dir = tempfile::tempdir().unwrap();
//!         let package = PackageFixture::new("pdf-tools")
//!             .tool(ToolFixture::shell("extract", &result_script(&json!({"pages": 3}))))
//!             .load(dir.path());
//!
//!         assert!(package.tool("extract").is_some());
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
