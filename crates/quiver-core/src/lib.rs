//! Shared vocabulary of the Quiver runtime.
//!
//! Every other crate speaks in these types: request, trace and call
//! identifiers, the [`ExecutionResult`] envelope with its closed
//! [`ErrorKind`] set, the package and tool naming rule, the base
//! environment of sandboxed processes, and UTF-8 safe truncation.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod env_policy;
pub mod naming;
pub mod result;
pub mod types;
pub mod utils;

pub use naming::{MAX_NAME_LEN, NameError, validate_name};
pub use result::{ErrorKind, ExecutionError, ExecutionResult, Metrics};
pub use types::{CallId, CallerIdentity, RequestId, Timestamp, TraceId};
pub use utils::{truncate_to_boundary, truncate_with_marker};
