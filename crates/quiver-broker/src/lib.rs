#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! The Quiver tool broker.
//!
//! The broker is the only component that reaches real filesystems,
//! networks, processes and credentials on behalf of a sandboxed tool:
//!
//! - Before dispatch it checks the tool exists, is not blocked by host
//!   policy, receives schema-valid arguments and, when gated, is confirmed.
//! - Concurrency is bounded globally and per capability.
//! - Every call from the sandbox is re-evaluated against the package
//!   permissions and the *current* external boundary, confirmed when the
//!   safety policy says so, performed, and audited.
//! - Secrets stay in the [`CredentialStore`]; the sandbox only ever holds a
//!   short-lived, request-scoped [`CapabilityToken`].
//! - Host cancellation maps one-to-one onto the sandbox's cancellation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use quiver_audit::AuditLog;
//! use quiver_broker::{Invocation, ToolBroker};
//! use quiver_crypto::KeyPair;
//! use quiver_policy::ExternalBoundary;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = ToolBroker::builder(Arc::new(AuditLog::in_memory(KeyPair::generate())))
//!     .boundary(ExternalBoundary::unrestricted("/work").with_network(["api.example.com"]))
//!     .build()?;
//!
//! let package = Arc::new(quiver_package::load_package(Path::new("skills/pdf-tools"))?);
//! let result = broker
//!     .execute(Invocation::new(package, "extract-text", serde_json::json!({"path": "a.pdf"})))
//!     .await;
//! println!("{}", result.to_value());
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod alarm;
pub mod approval;
pub mod bridge;
pub mod broker;
pub mod config;
pub mod credentials;
pub mod error;
mod gate;
pub mod host;
pub mod token;

pub use alarm::{AuditAlarm, LogAlarm};
pub use approval::{ApprovalDecision, ApprovalRequest, Approver, confirmation_error};
pub use broker::{Invocation, ToolBroker, ToolBrokerBuilder};
pub use config::BrokerConfig;
pub use credentials::{Credential, CredentialStore};
pub use error::{BrokerError, BrokerResult, TokenError};
pub use host::ExternalToolHost;
pub use token::{CapabilityToken, DEFAULT_CLOCK_SKEW_SECS, TokenGrant};
