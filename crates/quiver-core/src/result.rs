//! The canonical execution result envelope.
//!
//! Every terminal outcome of an execution request is exactly one
//! [`ExecutionResult`]. On the wire it is one of:
//!
//! ```json
//! {"ok": true,  "data": {...}, "metrics": {"duration_ms": 12}}
//! {"ok": false, "error": {"kind": "timeout", "message": "...", "retryable": false},
//!  "metrics": {"duration_ms": 30000}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Distinguished error kinds carried by a failed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The capability package failed manifest validation.
    ManifestValidation,
    /// The policy engine denied the action.
    PermissionDenied,
    /// A required out-of-band confirmation was not granted in time.
    ConfirmationRequired,
    /// Input or output failed its declared schema.
    SchemaViolation,
    /// The runtime stopped the execution after its wall-clock limit.
    Timeout,
    /// The host cancelled the execution.
    Cancelled,
    /// The tool itself failed.
    ToolExecution,
    /// The request named an unknown tool or was otherwise malformed.
    InvalidRequest,
}

impl ErrorKind {
    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManifestValidation => "manifest_validation",
            Self::PermissionDenied => "permission_denied",
            Self::ConfirmationRequired => "confirmation_required",
            Self::SchemaViolation => "schema_violation",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ToolExecution => "tool_execution",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload of a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Whether a caller may retry the same request.
    pub retryable: bool,
}

impl ExecutionError {
    /// Create a non-retryable error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    /// Set the retryable flag.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Execution metrics attached to every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl Metrics {
    /// Metrics for an execution that took `duration`.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Success(Value),
    Failure(ExecutionError),
}

/// The canonical envelope, produced once per request and immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResultWire", into = "ResultWire")]
pub struct ExecutionResult {
    outcome: Outcome,
    metrics: Metrics,
}

impl ExecutionResult {
    /// A successful result carrying `data`.
    #[must_use]
    pub fn success(data: Value, duration: Duration) -> Self {
        Self {
            outcome: Outcome::Success(data),
            metrics: Metrics::from_duration(duration),
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(error: ExecutionError, duration: Duration) -> Self {
        Self {
            outcome: Outcome::Failure(error),
            metrics: Metrics::from_duration(duration),
        }
    }

    /// Whether the execution succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Success payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success(data) => Some(data),
            Outcome::Failure(_) => None,
        }
    }

    /// Error payload, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ExecutionError> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(err) => Some(err),
        }
    }

    /// Error kind, if the execution failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|e| e.kind)
    }

    /// Attached metrics.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Compare two results ignoring metrics.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.outcome == other.outcome
    }

    /// Serialize to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let wire = ResultWire::from(self.clone());
        serde_json::to_value(wire).unwrap_or(Value::Null)
    }
}

#[derive(Serialize, Deserialize)]
struct ResultWire {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ExecutionError>,
    #[serde(default)]
    metrics: Metrics,
}

impl From<ExecutionResult> for ResultWire {
    fn from(result: ExecutionResult) -> Self {
        match result.outcome {
            Outcome::Success(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
                metrics: result.metrics,
            },
            Outcome::Failure(error) => Self {
                ok: false,
                data: None,
                error: Some(error),
                metrics: result.metrics,
            },
        }
    }
}

impl TryFrom<ResultWire> for ExecutionResult {
    type Error = String;

    fn try_from(wire: ResultWire) -> Result<Self, Self::Error> {
        let outcome = match (wire.ok, wire.data, wire.error) {
            (true, Some(data), None) => Outcome::Success(data),
            (false, None, Some(error)) => Outcome::Failure(error),
            (true, _, _) => return Err("ok envelope must carry data and no error".to_owned()),
            (false, _, _) => return Err("error envelope must carry error and no data".to_owned()),
        };
        Ok(Self {
            outcome,
            metrics: wire.metrics,
        })
    }
}
