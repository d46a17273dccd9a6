#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Default-deny permission evaluation for the Quiver runtime.
//!
//! A package's declared [`PermissionSet`](quiver_package::PermissionSet) is
//! intersected with the host's [`ExternalBoundary`]. Every side effect a
//! sandbox requests is judged against that intersection:
//!
//! - Paths are normalised against the execution root and matched with
//!   `/`-aware globs; anything that escapes the root is denied.
//! - URLs are reduced to host and port and matched against network entries.
//! - Process spawning needs both a declaration and a boundary that allows it.
//!
//! When the intersection of a declared category is provably empty the engine
//! reports [`DenyReason::EmptyIntersection`] instead of silently denying.
//!
//! # Example
//!
//! ```rust
//! use quiver_package::PermissionSet;
//! use quiver_policy::{ExternalBoundary, RequestedAction, evaluate};
//!
//! let perms = PermissionSet {
//!     fs_read: vec!["**/*.pdf".to_owned()],
//!     ..PermissionSet::default()
//! };
//! let boundary = ExternalBoundary::unrestricted("/work");
//! let action = RequestedAction::ReadFile { path: "/etc/passwd".to_owned() };
//! assert!(!evaluate(&perms, &boundary, &action).is_granted());
//! ```

pub mod prelude;

pub mod action;
pub mod boundary;
pub mod engine;
pub mod error;
pub mod path;
pub mod safety;

pub use action::{Decision, DenyReason, RequestedAction};
pub use boundary::ExternalBoundary;
pub use engine::{CategoryGrant, EffectiveSummary, effective_summary, evaluate};
pub use error::{PolicyError, PolicyResult};
pub use path::normalize;
pub use safety::{requires_confirmation, tool_requires_confirmation};
