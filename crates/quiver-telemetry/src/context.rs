//! Per-request correlation.

use std::time::Instant;

use quiver_core::{CallerIdentity, RequestId, TraceId};

/// Fields every log line of one execution carries.
///
/// The same request and trace identifiers appear in the audit records of
/// the execution, so log output and audit trail can be joined.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The execution request.
    pub request_id: RequestId,
    /// The host task it belongs to.
    pub trace_id: TraceId,
    /// Capability package.
    pub capability: String,
    /// Tool within the package.
    pub tool: String,
    /// Who asked, when the host said.
    pub caller: Option<CallerIdentity>,
    started: Instant,
}

impl RequestContext {
    /// Context for `tool` of `capability`; the clock starts now.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        trace_id: TraceId,
        capability: impl Into<String>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            trace_id,
            capability: capability.into(),
            tool: tool.into(),
            caller: None,
            started: Instant::now(),
        }
    }

    /// Attach the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: Option<CallerIdentity>) -> Self {
        self.caller = caller;
        self
    }

    /// Milliseconds since [`RequestContext::new`].
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The `execution` span. Broker and sandbox events nest under it.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        let caller = self.caller.as_ref().map(ToString::to_string);
        tracing::info_span!(
            "execution",
            request_id = %self.request_id,
            trace_id = %self.trace_id,
            capability = %self.capability,
            tool = %self.tool,
            caller = caller.as_deref().unwrap_or("-"),
        )
    }
}
