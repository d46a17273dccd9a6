//! The unit of work handed to the sandbox.

use std::sync::Arc;

use quiver_core::{CallerIdentity, RequestId, TraceId};
use quiver_package::{CapabilityPackage, ToolDefinition};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{SandboxError, SandboxResult};

/// One tool execution, owned by the sandbox runtime for its lifetime.
///
/// Arguments are expected to be validated against the tool's input schema
/// before the request is built.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Request identifier.
    pub request_id: RequestId,
    /// Trace identifier shared with the host task.
    pub trace_id: TraceId,
    /// Package the tool belongs to.
    pub package: Arc<CapabilityPackage>,
    /// Tool name within the package.
    pub tool: String,
    /// Validated arguments.
    pub arguments: Value,
    /// Who asked.
    pub caller: Option<CallerIdentity>,
    /// Scoped token the process may present back on broker calls.
    pub capability_token: Option<String>,
    /// Host cancellation.
    pub cancel: CancellationToken,
}

impl ExecutionRequest {
    /// Create a request with fresh identifiers and its own cancellation
    /// token.
    #[must_use]
    pub fn new(package: Arc<CapabilityPackage>, tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            request_id: RequestId::new(),
            trace_id: TraceId::new(),
            package,
            tool: tool.into(),
            arguments,
            caller: None,
            capability_token: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the request identifier.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Set the trace identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Set the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Attach a serialized capability token.
    #[must_use]
    pub fn with_capability_token(mut self, token: impl Into<String>) -> Self {
        self.capability_token = Some(token.into());
        self
    }

    /// Use `cancel` instead of the request's own token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::UnknownTool`] if the package has no such tool.
    pub fn definition(&self) -> SandboxResult<&ToolDefinition> {
        self.package
            .tool(&self.tool)
            .ok_or_else(|| SandboxError::UnknownTool(self.tool.clone()))
    }
}
