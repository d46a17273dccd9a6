//! The per-call gate between a sandbox and the outside world.
//!
//! Every `@quiver:call` goes through [`CallGate::handle_call`]:
//!
//! 1. Snapshot the current external boundary (it may have been swapped since
//!    the request started).
//! 2. Map the call to a [`RequestedAction`] and evaluate it. A denial is
//!    answered with a structured `permission_denied` response.
//! 3. Ask for confirmation when the package's safety policy gates the
//!    action's category.
//! 4. Perform the action, re-checking real filesystem locations.
//! 5. Scrub credentials from the answer and append one audit record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use quiver_audit::{ApprovalState, AuditOutcome, RecordBody, RecordKind};
use quiver_core::env_policy::{SAFE_PATH, base_env};
use quiver_core::utils::truncate_with_marker;
use quiver_core::{CallId, ErrorKind, ExecutionError, RequestId};
use quiver_policy::{
    Decision, ExternalBoundary, RequestedAction, effective_summary, evaluate, normalize,
    requires_confirmation,
};
use quiver_sandbox::{BrokerCall, BrokerPort, CallResponse, Redactor};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::approval::confirmation_error;
use crate::broker::{Inner, RequestScope, digest_redacted, duration_ms};
use crate::token::CapabilityToken;

/// Operation name checked against capability tokens.
pub(crate) const TOOL_INVOKE: &str = "tool.invoke";

/// Serves the broker calls of one request.
pub(crate) struct CallGate<'a> {
    inner: &'a Inner,
    scope: &'a RequestScope,
    redactor: &'a dyn Redactor,
}

impl<'a> CallGate<'a> {
    pub(crate) fn new(inner: &'a Inner, scope: &'a RequestScope, redactor: &'a dyn Redactor) -> Self {
        Self {
            inner,
            scope,
            redactor,
        }
    }

    async fn dispatch(&self, boundary: &ExternalBoundary, call: &BrokerCall) -> (CallResponse, ApprovalState) {
        let action = match call {
            BrokerCall::FsRead { path } => Some(RequestedAction::ReadFile { path: path.clone() }),
            BrokerCall::FsWrite { path, .. } => Some(RequestedAction::WriteFile {
                path: path.clone(),
                overwrite: exists_under(&boundary.root, path).await,
            }),
            BrokerCall::NetFetch { url, .. } => Some(RequestedAction::Connect { url: url.clone() }),
            BrokerCall::ProcessSpawn { program, .. } => Some(RequestedAction::SpawnProcess {
                program: program.clone(),
            }),
            // Gated by the capability token; the tool itself was confirmed
            // before dispatch.
            BrokerCall::ToolInvoke { .. } => None,
        };

        let mut approval = ApprovalState::NotRequired;
        if let Some(action) = &action {
            if let Decision::Deny { reason } = evaluate(self.scope.package.permissions(), boundary, action) {
                warn!(
                    request_id = %self.scope.request_id,
                    action = %action.describe(),
                    %reason,
                    "broker call denied"
                );
                return (
                    CallResponse::error(ErrorKind::PermissionDenied, reason.to_string()),
                    approval,
                );
            }
            if let Some(category) = requires_confirmation(self.scope.package.safety(), action) {
                let described = action.describe();
                let state = self
                    .inner
                    .confirm(self.scope, Some(category), described.clone(), None)
                    .await;
                if !state.is_approved() {
                    return (CallResponse::failure(confirmation_error(&state, &described)), state);
                }
                approval = state;
            }
        }

        let response = match call {
            BrokerCall::FsRead { path } => self.fs_read(&boundary.root, path).await,
            BrokerCall::FsWrite { path, content } => self.fs_write(&boundary.root, path, content).await,
            BrokerCall::NetFetch {
                url,
                method,
                headers,
                body,
            } => self.net_fetch(url, method, headers, body.as_deref()).await,
            BrokerCall::ProcessSpawn { program, args } => {
                self.process_spawn(&boundary.root, program, args).await
            },
            BrokerCall::ToolInvoke {
                host,
                tool,
                arguments,
                token,
            } => self.tool_invoke(host, tool, arguments, token.as_deref()).await,
        };
        (response, approval)
    }

    async fn fs_read(&self, root: &Path, path: &str) -> CallResponse {
        let target = match confine(root, path).await {
            Ok(target) => target,
            Err(response) => return response,
        };
        match tokio::fs::read(&target).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => CallResponse::success(json!({ "path": path, "content": content })),
                Err(_) => CallResponse::error(
                    ErrorKind::ToolExecution,
                    format!("`{path}` is not UTF-8 text"),
                ),
            },
            Err(e) => CallResponse::error(ErrorKind::ToolExecution, format!("cannot read `{path}`: {e}")),
        }
    }

    async fn fs_write(&self, root: &Path, path: &str, content: &str) -> CallResponse {
        let target = match confine(root, path).await {
            Ok(target) => target,
            Err(response) => return response,
        };
        if let Some(parent) = target.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return CallResponse::error(ErrorKind::ToolExecution, format!("cannot create `{path}`: {e}"));
        }
        match tokio::fs::write(&target, content).await {
            Ok(()) => CallResponse::success(json!({ "path": path, "bytes": content.len() })),
            Err(e) => CallResponse::error(ErrorKind::ToolExecution, format!("cannot write `{path}`: {e}")),
        }
    }

    async fn net_fetch(
        &self,
        url: &str,
        method: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&str>,
    ) -> CallResponse {
        let parsed = match url::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return CallResponse::error(ErrorKind::InvalidRequest, format!("invalid URL: {e}")),
        };
        let Ok(method) = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes()) else {
            return CallResponse::error(ErrorKind::InvalidRequest, format!("invalid HTTP method `{method}`"));
        };
        let host = parsed
            .host_str()
            .unwrap_or_default()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        let port = parsed.port_or_known_default().unwrap_or(0);

        let injected = self
            .inner
            .credentials
            .headers_for(&self.scope.package.manifest.secrets, &host, port);
        let mut request = self.inner.http.request(method, parsed);
        for (name, value) in headers {
            // Injected credentials win over sandbox-supplied headers.
            if !injected.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in &injected {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body.to_owned());
        }
        debug!(
            request_id = %self.scope.request_id,
            %host,
            port,
            credentials = injected.len(),
            "forwarding fetch"
        );

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect();
                return CallResponse::failure(
                    ExecutionError::new(ErrorKind::ToolExecution, format!("fetch failed: {e}"))
                        .with_retryable(retryable),
                );
            },
        };
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        match response.text().await {
            Ok(text) => CallResponse::success(json!({
                "status": status,
                "content_type": content_type,
                "body": truncate_with_marker(&text, self.inner.sandbox.config().result_ceiling),
            })),
            Err(e) => CallResponse::error(ErrorKind::ToolExecution, format!("reading response failed: {e}")),
        }
    }

    async fn process_spawn(&self, root: &Path, program: &str, args: &[String]) -> CallResponse {
        let cwd = match tokio::fs::canonicalize(root).await {
            Ok(cwd) => cwd,
            Err(e) => {
                return CallResponse::error(
                    ErrorKind::ToolExecution,
                    format!("execution root unavailable: {e}"),
                );
            },
        };
        let Ok(resolved) = which::which_in(program, Some(SAFE_PATH), &cwd) else {
            return CallResponse::error(ErrorKind::InvalidRequest, format!("program `{program}` not found"));
        };

        let mut cmd = tokio::process::Command::new(&resolved);
        cmd.args(args)
            .env_clear()
            .envs(base_env())
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let config = self.inner.sandbox.config();
        match tokio::time::timeout(config.default_timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let ceiling = config.diagnostic_ceiling;
                CallResponse::success(json!({
                    "status": output.status.code(),
                    "stdout": truncate_with_marker(&String::from_utf8_lossy(&output.stdout), ceiling),
                    "stderr": truncate_with_marker(&String::from_utf8_lossy(&output.stderr), ceiling),
                }))
            },
            Ok(Err(e)) => CallResponse::error(ErrorKind::ToolExecution, format!("cannot run `{program}`: {e}")),
            Err(_) => CallResponse::error(
                ErrorKind::Timeout,
                format!(
                    "`{program}` did not finish within {}s",
                    config.default_timeout.as_secs()
                ),
            ),
        }
    }

    async fn tool_invoke(&self, host: &str, tool: &str, arguments: &Value, token: Option<&str>) -> CallResponse {
        let Some(target) = self.inner.hosts.get(host) else {
            return CallResponse::error(ErrorKind::InvalidRequest, format!("unknown tool host `{host}`"));
        };
        let Some(token) = token else {
            return CallResponse::error(
                ErrorKind::PermissionDenied,
                "tool.invoke requires the request's capability token",
            );
        };
        let verified = CapabilityToken::decode(token).and_then(|t| {
            t.verify(
                &self.inner.token_key.public_key(),
                &self.scope.request_id,
                TOOL_INVOKE,
                host,
            )
        });
        if let Err(e) = verified {
            warn!(request_id = %self.scope.request_id, %host, error = %e, "capability token rejected");
            return CallResponse::error(ErrorKind::PermissionDenied, e.to_string());
        }
        match target.invoke(tool, arguments.clone()).await {
            Ok(data) => CallResponse::success(data),
            Err(message) => CallResponse::error(ErrorKind::ToolExecution, message),
        }
    }

    /// Remove anything credential-shaped before the answer reaches the
    /// sandbox.
    fn scrub(&self, response: CallResponse) -> CallResponse {
        let text = serde_json::to_string(&response).unwrap_or_default();
        let redacted = self.inner.credentials.redact(&text);
        if redacted == text {
            return response;
        }
        serde_json::from_str(&redacted).unwrap_or_else(|_| {
            CallResponse::error(ErrorKind::ToolExecution, "response withheld: contained a credential")
        })
    }
}

#[async_trait]
impl BrokerPort for CallGate<'_> {
    async fn handle_call(&self, request_id: RequestId, call_id: CallId, call: BrokerCall) -> CallResponse {
        let started = Instant::now();
        let boundary = self.inner.boundary().await;
        let input_digest = digest_redacted(&call, self.redactor);

        let (response, approval) = self.dispatch(&boundary, &call).await;
        let response = self.scrub(response);

        let outcome = match &response.error {
            None => AuditOutcome::Success,
            Some(error) => AuditOutcome::failure(error.kind, self.redactor.redact(&error.message)),
        };
        self.inner.record(RecordBody {
            request_id,
            trace_id: self.scope.trace_id,
            kind: RecordKind::Call {
                call_id,
                operation: call.operation().to_owned(),
                target: self.redactor.redact(&call.target()),
            },
            capability: self.scope.package.name().to_owned(),
            tool: self.scope.tool.clone(),
            caller: self.scope.caller.clone(),
            input_digest,
            output_digest: digest_redacted(&response, self.redactor),
            duration_ms: duration_ms(started.elapsed()),
            effective_permissions: effective_summary(self.scope.package.permissions(), &boundary)
                .to_string(),
            approval,
            outcome,
        });
        response
    }
}

/// Whether `requested` already exists under `root`.
async fn exists_under(root: &Path, requested: &str) -> bool {
    match normalize(root, requested) {
        Some(relative) => tokio::fs::try_exists(root.join(relative))
            .await
            .unwrap_or(false),
        None => false,
    }
}

/// Resolve `requested` under `root` and make sure its real location (after
/// symlinks) stays inside the root.
///
/// The policy engine judged the path lexically; this catches symlinks that
/// point out of the root. For a path that does not exist yet, the deepest
/// existing ancestor is checked.
async fn confine(root: &Path, requested: &str) -> Result<PathBuf, CallResponse> {
    let escapes = || {
        CallResponse::error(
            ErrorKind::PermissionDenied,
            format!("`{requested}` resolves outside the execution root"),
        )
    };
    let Some(relative) = normalize(root, requested) else {
        return Err(escapes());
    };
    let real_root = tokio::fs::canonicalize(root).await.map_err(|e| {
        CallResponse::error(ErrorKind::ToolExecution, format!("execution root unavailable: {e}"))
    })?;
    let target = real_root.join(relative);

    let mut probe = Some(target.as_path());
    while let Some(candidate) = probe {
        if let Ok(real) = tokio::fs::canonicalize(candidate).await {
            return if real.starts_with(&real_root) {
                Ok(target)
            } else {
                Err(escapes())
            };
        }
        probe = candidate.parent();
    }
    Err(escapes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confine_plain_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/a.txt"), "a").unwrap();

        let real = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(confine(dir.path(), "docs/a.txt").await.unwrap(), real.join("docs/a.txt"));
        assert_eq!(confine(dir.path(), "new/deep/b.txt").await.unwrap(), real.join("new/deep/b.txt"));
        assert!(confine(dir.path(), "../outside").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_confine_rejects_symlink_escape() {
        let dir = tempfile::TempDir::new().unwrap();
        let outside = tempfile::TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = confine(dir.path(), "link/secret.txt").await.unwrap_err();
        assert_eq!(err.error.unwrap().kind, ErrorKind::PermissionDenied);
        assert!(confine(dir.path(), "link/new.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_exists_under() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        assert!(exists_under(dir.path(), "a.txt").await);
        assert!(!exists_under(dir.path(), "b.txt").await);
        assert!(!exists_under(dir.path(), "../a.txt").await);
    }
}
