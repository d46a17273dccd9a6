//! Mock implementations for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quiver_audit::{AuditError, AuditRecord, AuditResult, AuditSink};
use quiver_broker::{ApprovalDecision, ApprovalRequest, Approver, AuditAlarm, ExternalToolHost};
use quiver_core::RequestId;
use serde_json::{Value, json};

/// Approver with a fixed answer, an optional delay and a record of every
/// request it saw.
///
/// Uses `std::sync::Mutex` internally so inspection works outside a tokio
/// runtime.
#[derive(Debug, Clone)]
pub struct MockApprover {
    answer: Option<ApprovalDecision>,
    delay: Option<Duration>,
    seen: Arc<Mutex<Vec<ApprovalRequest>>>,
}

impl MockApprover {
    fn answering(answer: Option<ApprovalDecision>) -> Self {
        Self {
            answer,
            delay: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Approves everything as `approver`.
    #[must_use]
    pub fn approving(approver: &str) -> Self {
        Self::answering(Some(ApprovalDecision::Approved {
            approver: approver.to_owned(),
        }))
    }

    /// Denies everything with `reason`.
    #[must_use]
    pub fn denying(reason: &str) -> Self {
        Self::answering(Some(ApprovalDecision::Denied {
            reason: Some(reason.to_owned()),
        }))
    }

    /// Never reaches a decision.
    #[must_use]
    pub fn silent() -> Self {
        Self::answering(None)
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests seen so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.seen.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Approver for MockApprover {
    async fn decide(&self, request: &ApprovalRequest) -> Option<ApprovalDecision> {
        if let Ok(mut guard) = self.seen.lock() {
            guard.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone()
    }
}

/// Alarm that counts audit write failures.
#[derive(Debug, Default)]
pub struct CountingAlarm {
    raised: AtomicUsize,
}

impl CountingAlarm {
    /// Create a new alarm.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Times the alarm fired.
    #[must_use]
    pub fn count(&self) -> usize {
        self.raised.load(Ordering::SeqCst)
    }
}

impl AuditAlarm for CountingAlarm {
    fn audit_write_failed(&self, _request_id: &RequestId, _error: &AuditError) {
        self.raised.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tool host answering `{"tool": ..., "arguments": ...}`; tools named
/// `fail` return an error.
#[derive(Debug)]
pub struct EchoToolHost {
    name: String,
    calls: Mutex<Vec<(String, Value)>>,
}

impl EchoToolHost {
    /// A host addressed as `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExternalToolHost for EchoToolHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value, String> {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push((tool.to_owned(), arguments.clone()));
        }
        if tool == "fail" {
            return Err(format!("{} refused `{tool}`", self.name));
        }
        Ok(json!({ "tool": tool, "arguments": arguments }))
    }
}

/// Audit sink whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingSink;

impl AuditSink for FailingSink {
    fn append(&self, _record: &AuditRecord) -> AuditResult<()> {
        Err(AuditError::Sink("sink unavailable".to_owned()))
    }

    fn records_for(&self, _request_id: &RequestId) -> AuditResult<Vec<AuditRecord>> {
        Ok(Vec::new())
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(0)
    }
}
