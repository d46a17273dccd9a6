//! Line framing between the runtime and the sandboxed process.
//!
//! The process receives one `invoke` frame on stdin. On stdout, a line
//! starting with [`RESULT_PREFIX`] carries the result and a line starting
//! with [`CALL_PREFIX`] is a broker call. Each call is answered with exactly
//! one JSON line on stdin before the next call is read. Every other line, and
//! all of stderr, is diagnostic text.
//!
//! ```text
//! <- {"type":"invoke","request_id":"...","tool":"extract-text","handler":null,"arguments":{...}}
//! -> @quiver:call {"op":"fs.read","path":"docs/a.pdf"}
//! <- {"ok":true,"data":{"content":"..."}}
//! -> @quiver:result {"ok":true,"data":{"pages":3}}
//! ```

use async_trait::async_trait;
use quiver_core::{CallId, ErrorKind, ExecutionError, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix of the result frame.
pub const RESULT_PREFIX: &str = "@quiver:result ";

/// Prefix of a broker call frame.
pub const CALL_PREFIX: &str = "@quiver:call ";

/// A classified stdout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Result payload (prefix stripped).
    Result(&'a str),
    /// Broker call payload (prefix stripped).
    Call(&'a str),
    /// Anything else.
    Diagnostic(&'a str),
}

/// Classify one stdout line.
#[must_use]
pub fn classify(line: &str) -> Frame<'_> {
    if let Some(payload) = line.strip_prefix(RESULT_PREFIX) {
        Frame::Result(payload)
    } else if let Some(payload) = line.strip_prefix(CALL_PREFIX) {
        Frame::Call(payload)
    } else {
        Frame::Diagnostic(line)
    }
}

/// The frame written to the process on start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeFrame {
    /// Always `"invoke"`.
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Request identifier.
    pub request_id: RequestId,
    /// Tool name.
    pub tool: String,
    /// Handler within the entrypoint, when declared.
    pub handler: Option<String>,
    /// Validated arguments.
    pub arguments: Value,
}

impl InvokeFrame {
    /// Build the invoke frame for a tool call.
    #[must_use]
    pub fn new(request_id: RequestId, tool: &str, handler: Option<&str>, arguments: Value) -> Self {
        Self {
            frame_type: "invoke".to_owned(),
            request_id,
            tool: tool.to_owned(),
            handler: handler.map(str::to_owned),
            arguments,
        }
    }

    /// Encode as a newline-terminated JSON line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// A side effect the sandboxed process asks the broker to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum BrokerCall {
    /// Read a file under the execution root.
    #[serde(rename = "fs.read")]
    FsRead {
        /// Root-relative path.
        path: String,
    },
    /// Write a file under the execution root.
    #[serde(rename = "fs.write")]
    FsWrite {
        /// Root-relative path.
        path: String,
        /// UTF-8 content.
        content: String,
    },
    /// Fetch a URL.
    #[serde(rename = "net.fetch")]
    NetFetch {
        /// Absolute URL.
        url: String,
        /// HTTP method, `GET` when absent.
        #[serde(default = "default_method")]
        method: String,
        /// Extra request headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Request body.
        #[serde(default)]
        body: Option<String>,
    },
    /// Run a helper program.
    #[serde(rename = "process.spawn")]
    ProcessSpawn {
        /// Program name or path.
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
    },
    /// Call a tool on an external tool host.
    #[serde(rename = "tool.invoke")]
    ToolInvoke {
        /// Host name.
        host: String,
        /// Tool name on that host.
        tool: String,
        /// Arguments.
        #[serde(default)]
        arguments: Value,
        /// Capability token presented back, when the process holds one.
        #[serde(default)]
        token: Option<String>,
    },
}

fn default_method() -> String {
    "GET".to_owned()
}

impl BrokerCall {
    /// Parse a call payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error message for a malformed call.
    pub fn parse(payload: &str) -> Result<Self, String> {
        serde_json::from_str(payload).map_err(|e| e.to_string())
    }

    /// Wire name of the operation.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::FsRead { .. } => "fs.read",
            Self::FsWrite { .. } => "fs.write",
            Self::NetFetch { .. } => "net.fetch",
            Self::ProcessSpawn { .. } => "process.spawn",
            Self::ToolInvoke { .. } => "tool.invoke",
        }
    }

    /// What the call targets, for audit.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::FsRead { path } | Self::FsWrite { path, .. } => path.clone(),
            Self::NetFetch { url, .. } => url.clone(),
            Self::ProcessSpawn { program, .. } => program.clone(),
            Self::ToolInvoke { host, tool, .. } => format!("{host}/{tool}"),
        }
    }
}

/// Answer to one broker call, written back as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl CallResponse {
    /// A successful answer.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// A refused or failed call.
    #[must_use]
    pub fn failure(error: ExecutionError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }

    /// Shorthand for a failure of `kind`.
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::failure(ExecutionError::new(kind, message))
    }

    /// Encode as a newline-terminated JSON line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// The broker side of the call channel.
///
/// The runtime calls this once per `@quiver:call` frame, in order, and never
/// has two calls of the same request outstanding.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Handle call `call_id` of request `request_id`.
    async fn handle_call(&self, request_id: RequestId, call_id: CallId, call: BrokerCall) -> CallResponse;
}

/// A port that refuses every call.
///
/// For running a tool with no broker attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPort;

#[async_trait]
impl BrokerPort for DenyAllPort {
    async fn handle_call(&self, _request_id: RequestId, _call_id: CallId, call: BrokerCall) -> CallResponse {
        CallResponse::error(
            ErrorKind::PermissionDenied,
            format!("{} is not available in this context", call.operation()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify() {
        assert_eq!(classify("@quiver:result {}"), Frame::Result("{}"));
        assert_eq!(classify("@quiver:call {\"op\":\"x\"}"), Frame::Call("{\"op\":\"x\"}"));
        assert_eq!(classify("progress 50%"), Frame::Diagnostic("progress 50%"));
        // Prefix must start the line.
        assert_eq!(
            classify(" @quiver:result {}"),
            Frame::Diagnostic(" @quiver:result {}")
        );
    }

    #[test]
    fn test_parse_calls() {
        let call = BrokerCall::parse(r#"{"op":"fs.read","path":"docs/a.pdf"}"#).unwrap();
        assert_eq!(call.operation(), "fs.read");
        assert_eq!(call.target(), "docs/a.pdf");

        let call = BrokerCall::parse(r#"{"op":"net.fetch","url":"https://api.example.com/v1"}"#).unwrap();
        let BrokerCall::NetFetch { method, headers, .. } = call else {
            panic!("expected net.fetch");
        };
        assert_eq!(method, "GET");
        assert!(headers.is_empty());

        assert!(BrokerCall::parse(r#"{"op":"fs.delete","path":"x"}"#).is_err());
        assert!(BrokerCall::parse("not json").is_err());
    }

    #[test]
    fn test_response_lines() {
        let ok = CallResponse::success(json!({"content": "hi"}));
        assert_eq!(ok.to_line(), "{\"ok\":true,\"data\":{\"content\":\"hi\"}}\n");
        let denied = CallResponse::error(ErrorKind::PermissionDenied, "nope");
        let value: Value = serde_json::from_str(denied.to_line().trim_end()).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["kind"], "permission_denied");
    }

    #[test]
    fn test_invoke_frame() {
        let frame = InvokeFrame::new(RequestId::new(), "extract-text", None, json!({"path": "a.pdf"}));
        let line = frame.to_line();
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "invoke");
        assert_eq!(value["arguments"]["path"], "a.pdf");
    }

    #[tokio::test]
    async fn test_deny_all_port() {
        let response = DenyAllPort
            .handle_call(
                RequestId::new(),
                CallId(1),
                BrokerCall::FsRead {
                    path: "a".to_owned(),
                },
            )
            .await;
        assert!(!response.ok);
    }
}
