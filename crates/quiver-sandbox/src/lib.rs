#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Isolated tool execution for the Quiver runtime.
//!
//! Each [`ExecutionRequest`] runs in its own child process:
//!
//! - The interpreter is chosen by the tool's runtime kind and started in a
//!   fresh process group with a scrubbed environment, resource limits and
//!   optional bubblewrap isolation.
//! - Output is framed: a single result frame, serialized broker calls, and
//!   everything else as bounded, redacted diagnostics.
//! - Timeouts and host cancellation stop the process group, run the
//!   package's cleanup hook once, and force-kill after the grace period.
//! - The raw result is normalized into one [`ExecutionResult`](quiver_core::ExecutionResult).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use quiver_sandbox::{DenyAllPort, ExecutionRequest, PatternRedactor, SandboxRuntime};
//!
//! # async fn example() {
//! let package = Arc::new(quiver_package::load_package(Path::new("skills/pdf-tools")).unwrap());
//! let request = ExecutionRequest::new(package, "extract-text", serde_json::json!({"path": "a.pdf"}));
//! let outcome = SandboxRuntime::default()
//!     .run(&request, &DenyAllPort, &PatternRedactor::default())
//!     .await;
//! println!("{}", outcome.result.to_value());
//! # }
//! ```

pub mod prelude;

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod handle;
mod limits;
pub mod normalize;
pub mod protocol;
pub mod redact;
pub mod request;
pub mod runner;
pub mod state;

pub use config::{Interpreters, Isolation, ResourceLimits, SandboxConfig};
pub use error::{SandboxError, SandboxResult};
pub use handle::{AsyncHandle, HandleCompleter, HandleStatus, handle_pair};
pub use normalize::{RawOutput, normalize};
pub use protocol::{BrokerCall, BrokerPort, CallResponse, DenyAllPort};
pub use redact::{NoopRedactor, PatternRedactor, REDACTED, Redactor, RedactorChain};
pub use request::ExecutionRequest;
pub use runner::{SandboxOutcome, SandboxRuntime};
pub use state::{SandboxState, StateMachine};
