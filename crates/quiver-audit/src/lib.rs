#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Quiver Audit - signed, hash-chained execution records.
//!
//! This crate provides:
//! - [`AuditRecord`]s signed by the broker's ed25519 key
//! - One chain per request (each record carries the hash of its predecessor)
//! - Append-only sinks: in-memory and JSON lines on disk
//! - Chain verification
//!
//! # Security Model
//!
//! Inputs and outputs are recorded as BLAKE3 digests of their redacted form,
//! never verbatim. Removing, reordering or editing a record breaks either its
//! signature or the link of its successor.
//!
//! # Example
//!
//! ```
//! use quiver_audit::{ApprovalState, AuditLog, AuditOutcome, RecordBody, RecordKind};
//! use quiver_core::{RequestId, TraceId};
//! use quiver_crypto::{ContentHash, KeyPair};
//!
//! let log = AuditLog::in_memory(KeyPair::generate());
//! let request_id = RequestId::new();
//! log.append(RecordBody {
//!     request_id,
//!     trace_id: TraceId::new(),
//!     kind: RecordKind::RequestSummary { calls: 0 },
//!     capability: "pdf-tools".to_string(),
//!     tool: "extract-text".to_string(),
//!     caller: None,
//!     input_digest: ContentHash::hash(b"{}"),
//!     output_digest: ContentHash::hash(b"{}"),
//!     duration_ms: 4,
//!     effective_permissions: String::new(),
//!     approval: ApprovalState::NotRequired,
//!     outcome: AuditOutcome::Success,
//! }).unwrap();
//!
//! assert!(log.verify_chain(&request_id).unwrap().valid);
//! ```

pub mod prelude;

mod error;
mod log;
mod record;
mod sink;

pub use error::{AuditError, AuditResult};
pub use log::{AuditLog, ChainIssue, ChainVerification, verify_records};
pub use record::{ApprovalState, AuditOutcome, AuditRecord, RecordBody, RecordKind};
pub use sink::{AuditSink, JsonlSink, MemorySink};
