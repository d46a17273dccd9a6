//! Logging for the Quiver runtime.
//!
//! [`setup_logging`] installs a `tracing-subscriber` stack on stderr in one
//! of four formats. [`RequestContext`] opens the `execution` span that ties
//! every event of one request to its request and trace identifiers.
//!
//! ```rust,no_run
//! use quiver_core::{RequestId, TraceId};
//! use quiver_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! setup_logging(
//!     &LogConfig::new("info")
//!         .with_format(LogFormat::Json)
//!         .with_directive("quiver_sandbox=debug"),
//! )
//! .unwrap();
//!
//! let ctx = RequestContext::new(RequestId::new(), TraceId::new(), "pdf-tools", "extract-text");
//! let _entered = ctx.span().entered();
//! tracing::info!("dispatching");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, setup_logging};
