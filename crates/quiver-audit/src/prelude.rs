//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_audit::prelude::*;` to import all essential types.

pub use crate::{
    ApprovalState, AuditError, AuditLog, AuditOutcome, AuditRecord, AuditResult, AuditSink,
    ChainVerification, RecordBody, RecordKind,
};
