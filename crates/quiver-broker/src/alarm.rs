//! Audit failure alarms.
//!
//! A failed audit write never fails the execution it describes. It is
//! logged, counted, and forwarded to an [`AuditAlarm`] so the host can page
//! someone or stop accepting work.

use quiver_audit::AuditError;
use quiver_core::RequestId;
use tracing::error;

/// Receives audit write failures.
pub trait AuditAlarm: Send + Sync {
    /// Called once per failed append.
    fn audit_write_failed(&self, request_id: &RequestId, error: &AuditError);
}

/// Alarm that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlarm;

impl AuditAlarm for LogAlarm {
    fn audit_write_failed(&self, request_id: &RequestId, error: &AuditError) {
        error!(%request_id, %error, "AUDIT ALARM: audit record lost");
    }
}
