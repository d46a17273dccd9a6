//! Request orchestration.
//!
//! [`ToolBroker::execute`] takes one invocation from admission to its single
//! terminal envelope:
//!
//! ```text
//! invocation
//!   -> tool lookup            (invalid_request)
//!   -> host blocklists        (permission_denied)
//!   -> input schema           (schema_violation)
//!   -> tool confirmation      (confirmation_required)
//!   -> global + per-capability permits
//!   -> sandbox run, every call through the gate
//!   -> summary audit record
//! ```
//!
//! Nothing before the permits touches a sandbox resource.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use quiver_audit::{ApprovalState, AuditLog, AuditOutcome, RecordBody, RecordKind};
use quiver_core::{
    CallerIdentity, ErrorKind, ExecutionError, ExecutionResult, RequestId, TraceId,
};
use quiver_crypto::{ContentHash, KeyPair, PublicKey};
use quiver_package::schema::validate_instance;
use quiver_package::{ActionCategory, CapabilityPackage, ToolHostBinding};
use quiver_policy::{ExternalBoundary, effective_summary, tool_requires_confirmation};
use quiver_sandbox::{
    AsyncHandle, ExecutionRequest, HandleCompleter, PatternRedactor, Redactor, RedactorChain,
    SandboxConfig, SandboxRuntime, handle_pair,
};
use quiver_telemetry::RequestContext;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::alarm::{AuditAlarm, LogAlarm};
use crate::approval::{ApprovalRequest, Approver, confirmation_error, seek_approval};
use crate::config::BrokerConfig;
use crate::credentials::CredentialStore;
use crate::error::{BrokerError, BrokerResult, TokenError};
use crate::gate::{CallGate, TOOL_INVOKE};
use crate::host::ExternalToolHost;
use crate::token::{CapabilityToken, TokenGrant};

/// One request to run a tool.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Request identifier, also the cancellation key.
    pub request_id: RequestId,
    /// Trace correlating the request with the host task.
    pub trace_id: TraceId,
    /// The loaded package.
    pub package: Arc<CapabilityPackage>,
    /// Tool name within the package.
    pub tool: String,
    /// Arguments, validated against the tool's input schema.
    pub arguments: Value,
    /// Who asked.
    pub caller: Option<CallerIdentity>,
}

impl Invocation {
    /// Invoke `tool` of `package` with `arguments`.
    #[must_use]
    pub fn new(package: Arc<CapabilityPackage>, tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            request_id: RequestId::new(),
            trace_id: TraceId::new(),
            package,
            tool: tool.into(),
            arguments,
            caller: None,
        }
    }

    /// Invoke the tool a host knows as `exported`, mapped back through the
    /// host's binding. `None` when the binding does not expose that name.
    #[must_use]
    pub fn for_host(
        binding: &dyn ToolHostBinding,
        package: Arc<CapabilityPackage>,
        exported: &str,
        arguments: Value,
    ) -> Option<Self> {
        let tool = binding.resolve(&package, exported)?.name.clone();
        let caller = CallerIdentity::new(binding.host(), "host");
        Some(Self::new(package, tool, arguments).with_caller(caller))
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
}

/// What the gate needs to know about the request it serves.
#[derive(Debug)]
pub(crate) struct RequestScope {
    pub(crate) request_id: RequestId,
    pub(crate) trace_id: TraceId,
    pub(crate) package: Arc<CapabilityPackage>,
    pub(crate) tool: String,
    pub(crate) arguments: Value,
    pub(crate) caller: Option<CallerIdentity>,
    pub(crate) cancel: CancellationToken,
}

/// Shared broker state.
pub(crate) struct Inner {
    pub(crate) config: BrokerConfig,
    pub(crate) sandbox: SandboxRuntime,
    pub(crate) credentials: Arc<CredentialStore>,
    pub(crate) hosts: HashMap<String, Arc<dyn ExternalToolHost>>,
    pub(crate) token_key: KeyPair,
    pub(crate) http: reqwest::Client,
    audit: Arc<AuditLog>,
    alarm: Arc<dyn AuditAlarm>,
    audit_failures: AtomicU64,
    boundary: RwLock<ExternalBoundary>,
    approver: Option<Arc<dyn Approver>>,
    global: Arc<Semaphore>,
    per_capability: DashMap<String, Arc<Semaphore>>,
    inflight: DashMap<RequestId, CancellationToken>,
}

/// The broker: admits invocations, runs them in sandboxes, serves their
/// calls and audits everything.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ToolBroker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ToolBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBroker")
            .field("config", &self.inner.config)
            .field("credentials", &self.inner.credentials)
            .field("hosts", &self.inner.hosts.keys().collect::<Vec<_>>())
            .field("inflight", &self.inner.inflight.len())
            .finish_non_exhaustive()
    }
}

impl ToolBroker {
    /// Start building a broker that audits into `audit`.
    #[must_use]
    pub fn builder(audit: Arc<AuditLog>) -> ToolBrokerBuilder {
        ToolBrokerBuilder::new(audit)
    }

    /// Run `invocation` to completion.
    ///
    /// Never fails: refusals, tool errors, timeouts and cancellation are all
    /// carried by the returned envelope.
    pub async fn execute(&self, invocation: Invocation) -> ExecutionResult {
        let cancel = self.inner.register(invocation.request_id);
        self.drive(invocation, cancel, None).await
    }

    /// Start `invocation` in the background and return a handle to poll.
    ///
    /// Must be called within a Tokio runtime.
    pub fn submit(&self, invocation: Invocation) -> AsyncHandle {
        let (completer, handle) = handle_pair(invocation.request_id);
        let cancel = self.inner.register(invocation.request_id);
        let broker = self.clone();
        tokio::spawn(async move {
            let result = broker.drive(invocation, cancel, Some(&completer)).await;
            completer.complete(result);
        });
        handle
    }

    /// Cancel a running or queued request.
    ///
    /// Returns `false` when no such request is in flight.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        match self.inner.inflight.get(request_id) {
            Some(token) => {
                info!(%request_id, "cancellation requested");
                token.cancel();
                true
            },
            None => false,
        }
    }

    /// Replace the external boundary. Calls evaluated after this returns see
    /// the new boundary, including calls of requests already running.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Boundary`] if the boundary is invalid; the old
    /// boundary stays in force.
    pub async fn set_boundary(&self, boundary: ExternalBoundary) -> BrokerResult<()> {
        boundary.validate()?;
        info!(root = %boundary.root.display(), "external boundary replaced");
        *self.inner.boundary.write().await = boundary;
        Ok(())
    }

    /// The current external boundary.
    pub async fn boundary(&self) -> ExternalBoundary {
        self.inner.boundary().await
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.inner.audit
    }

    /// Number of audit records that could not be written.
    #[must_use]
    pub fn audit_failures(&self) -> u64 {
        self.inner.audit_failures.load(Ordering::Relaxed)
    }

    /// Key capability tokens are signed with.
    #[must_use]
    pub fn token_issuer(&self) -> PublicKey {
        self.inner.token_key.public_key()
    }

    /// Number of requests admitted and not yet finished.
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Verify an encoded capability token for `operation` on `resource`.
    ///
    /// # Errors
    ///
    /// Returns the reason the token is refused.
    pub fn verify_token(
        &self,
        encoded: &str,
        request_id: &RequestId,
        operation: &str,
        resource: &str,
    ) -> Result<CapabilityToken, TokenError> {
        let token = CapabilityToken::decode(encoded)?;
        token.verify(&self.token_issuer(), request_id, operation, resource)?;
        Ok(token)
    }

    async fn drive(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
        completer: Option<&HandleCompleter>,
    ) -> ExecutionResult {
        let context = RequestContext::new(
            invocation.request_id,
            invocation.trace_id,
            invocation.package.name(),
            &invocation.tool,
        )
        .with_caller(invocation.caller.clone());
        let span = context.span();

        let scope = RequestScope {
            request_id: invocation.request_id,
            trace_id: invocation.trace_id,
            package: invocation.package,
            tool: invocation.tool,
            arguments: invocation.arguments,
            caller: invocation.caller,
            cancel,
        };
        let redactor = RedactorChain::new()
            .with(Arc::clone(&self.inner.credentials) as Arc<dyn Redactor>)
            .with(Arc::new(PatternRedactor::for_policy(scope.package.safety())));

        let started = Instant::now();
        let (result, approval, calls) = self
            .inner
            .run_request(&scope, &redactor, completer)
            .instrument(span.clone())
            .await;
        self.inner.inflight.remove(&scope.request_id);

        // The summary reflects the boundary in force when the request ended.
        let boundary = self.inner.boundary().await;
        span.in_scope(|| {
            self.inner.record_summary(
                &scope,
                &boundary,
                &redactor,
                &result,
                approval,
                calls,
                started.elapsed(),
            );
            match result.error() {
                None => info!(duration_ms = context.elapsed_ms(), calls, "request completed"),
                Some(error) => info!(
                    duration_ms = context.elapsed_ms(),
                    calls,
                    kind = %error.kind,
                    "request failed"
                ),
            }
        });
        result
    }
}

impl Inner {
    fn register(&self, request_id: RequestId) -> CancellationToken {
        self.inflight
            .entry(request_id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    pub(crate) async fn boundary(&self) -> ExternalBoundary {
        self.boundary.read().await.clone()
    }

    async fn run_request(
        &self,
        scope: &RequestScope,
        redactor: &RedactorChain,
        completer: Option<&HandleCompleter>,
    ) -> (ExecutionResult, ApprovalState, u64) {
        let started = Instant::now();
        let refuse = |kind: ErrorKind, message: String, approval: ApprovalState| {
            (
                ExecutionResult::failure(ExecutionError::new(kind, message), started.elapsed()),
                approval,
                0,
            )
        };
        let capability = scope.package.name();

        let Some(tool) = scope.package.tool(&scope.tool) else {
            return refuse(
                ErrorKind::InvalidRequest,
                format!("capability `{capability}` has no tool `{}`", scope.tool),
                ApprovalState::NotRequired,
            );
        };
        if let Some(reason) = self.config.blocked(capability, &tool.name) {
            warn!(%reason, "invocation blocked");
            return refuse(ErrorKind::PermissionDenied, reason, ApprovalState::NotRequired);
        }
        if let Err(violations) = validate_instance(&tool.input_schema, &scope.arguments) {
            return refuse(
                ErrorKind::SchemaViolation,
                format!("arguments do not match the input schema: {violations}"),
                ApprovalState::NotRequired,
            );
        }

        let mut approval = ApprovalState::NotRequired;
        if tool_requires_confirmation(tool, self.config.strict_confirmation)
            || scope.package.safety().requires(ActionCategory::ToolInvocation)
        {
            let action = format!("run {capability}/{}", tool.name);
            let prompt = tool.confirmation.as_ref().and_then(|c| c.prompt.clone());
            let state = self.confirm(scope, None, action.clone(), prompt).await;
            if scope.cancel.is_cancelled() {
                return refuse(ErrorKind::Cancelled, "request cancelled".to_owned(), state);
            }
            if !state.is_approved() {
                let error = confirmation_error(&state, &action);
                return (ExecutionResult::failure(error, started.elapsed()), state, 0);
            }
            approval = state;
        }

        let permits = tokio::select! {
            biased;
            () = scope.cancel.cancelled() => None,
            permits = self.acquire(capability) => permits,
        };
        let Some(_permits) = permits else {
            return refuse(
                ErrorKind::Cancelled,
                "request cancelled before dispatch".to_owned(),
                approval,
            );
        };
        if let Some(completer) = completer {
            completer.mark_running();
        }

        let mut request = ExecutionRequest::new(
            Arc::clone(&scope.package),
            tool.name.clone(),
            scope.arguments.clone(),
        )
        .with_request_id(scope.request_id)
        .with_trace_id(scope.trace_id)
        .with_cancel(scope.cancel.clone());
        if let Some(caller) = &scope.caller {
            request = request.with_caller(caller.clone());
        }
        if let Some(token) = self.issue_token(scope) {
            request = request.with_capability_token(token.encode());
        }

        let gate = CallGate::new(self, scope, redactor);
        let outcome = self.sandbox.run(&request, &gate, redactor).await;
        debug!(
            states = ?outcome.states,
            exit_code = ?outcome.exit_code,
            cleanup_invocations = outcome.cleanup_invocations,
            "sandbox finished"
        );
        if !outcome.diagnostics.is_empty() {
            debug!(diagnostics = %outcome.diagnostics, "sandbox diagnostics");
        }
        (outcome.result, approval, outcome.calls)
    }

    /// Global permit first, then the capability's own.
    async fn acquire(&self, capability: &str) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
        let global = Arc::clone(&self.global).acquire_owned().await.ok()?;
        let own = self
            .per_capability
            .entry(capability.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_capability_max)))
            .clone();
        let own = own.acquire_owned().await.ok()?;
        Some((global, own))
    }

    /// Token listing what the broker forwards for this request, if anything.
    fn issue_token(&self, scope: &RequestScope) -> Option<CapabilityToken> {
        let mut grants: Vec<TokenGrant> = self
            .hosts
            .keys()
            .map(|host| TokenGrant::new(TOOL_INVOKE, host.clone()))
            .collect();
        grants.sort_by(|a, b| a.resource.cmp(&b.resource));

        let declared: Vec<_> = scope
            .package
            .permissions()
            .network
            .iter()
            .filter_map(|raw| quiver_package::NetworkEntry::parse(raw).ok())
            .collect();
        for credential in self.credentials.usable(&scope.package.manifest.secrets) {
            for entry in credential.hosts() {
                let reachable = declared
                    .iter()
                    .any(|d| d.is_covered_by(entry) || entry.is_covered_by(d));
                if reachable {
                    grants.push(TokenGrant::new("net.fetch", entry.to_string()));
                }
            }
        }

        if grants.is_empty() {
            return None;
        }
        Some(CapabilityToken::issue(
            &self.token_key,
            scope.request_id,
            scope.package.name(),
            grants,
            self.config.token_ttl,
        ))
    }

    /// Ask the approver, giving up early if the request is cancelled.
    pub(crate) async fn confirm(
        &self,
        scope: &RequestScope,
        category: Option<ActionCategory>,
        action: String,
        prompt: Option<String>,
    ) -> ApprovalState {
        let request = ApprovalRequest {
            request_id: scope.request_id,
            capability: scope.package.name().to_owned(),
            tool: scope.tool.clone(),
            category,
            action,
            prompt,
        };
        tokio::select! {
            () = scope.cancel.cancelled() => ApprovalState::Denied {
                reason: Some("request cancelled".to_owned()),
            },
            state = seek_approval(self.approver.as_deref(), &request, self.config.confirmation_timeout) => state,
        }
    }

    /// Append a record. Failure is logged, counted and alarmed, never
    /// propagated.
    pub(crate) fn record(&self, body: RecordBody) {
        let request_id = body.request_id;
        if let Err(e) = self.audit.append(body) {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
            error!(%request_id, error = %e, "audit write failed");
            self.alarm.audit_write_failed(&request_id, &e);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_summary(
        &self,
        scope: &RequestScope,
        boundary: &ExternalBoundary,
        redactor: &dyn Redactor,
        result: &ExecutionResult,
        approval: ApprovalState,
        calls: u64,
        elapsed: Duration,
    ) {
        let outcome = match result.error() {
            None => AuditOutcome::Success,
            Some(error) => AuditOutcome::failure(error.kind, redactor.redact(&error.message)),
        };
        self.record(RecordBody {
            request_id: scope.request_id,
            trace_id: scope.trace_id,
            kind: RecordKind::RequestSummary { calls },
            capability: scope.package.name().to_owned(),
            tool: scope.tool.clone(),
            caller: scope.caller.clone(),
            input_digest: digest_redacted(&scope.arguments, redactor),
            output_digest: digest_redacted(&result.to_value(), redactor),
            duration_ms: duration_ms(elapsed),
            effective_permissions: effective_summary(scope.package.permissions(), boundary).to_string(),
            approval,
            outcome,
        });
    }
}

/// Digest of the redacted JSON form of `value`.
pub(crate) fn digest_redacted<T: Serialize>(value: &T, redactor: &dyn Redactor) -> ContentHash {
    let text = serde_json::to_string(value).unwrap_or_default();
    ContentHash::hash(redactor.redact(&text).as_bytes())
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builds a [`ToolBroker`].
pub struct ToolBrokerBuilder {
    audit: Arc<AuditLog>,
    config: BrokerConfig,
    sandbox: SandboxConfig,
    boundary: Option<ExternalBoundary>,
    credentials: CredentialStore,
    approver: Option<Arc<dyn Approver>>,
    alarm: Arc<dyn AuditAlarm>,
    hosts: Vec<Arc<dyn ExternalToolHost>>,
    token_key: Option<KeyPair>,
}

impl std::fmt::Debug for ToolBrokerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBrokerBuilder")
            .field("config", &self.config)
            .field("boundary", &self.boundary)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl ToolBrokerBuilder {
    fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            audit,
            config: BrokerConfig::default(),
            sandbox: SandboxConfig::default(),
            boundary: None,
            credentials: CredentialStore::new(),
            approver: None,
            alarm: Arc::new(LogAlarm),
            hosts: Vec::new(),
            token_key: None,
        }
    }

    /// Host policy and ceilings.
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sandbox settings.
    #[must_use]
    pub fn sandbox(mut self, config: SandboxConfig) -> Self {
        self.sandbox = config;
        self
    }

    /// Initial external boundary. Defaults to an unrestricted boundary
    /// rooted at the current directory.
    #[must_use]
    pub fn boundary(mut self, boundary: ExternalBoundary) -> Self {
        self.boundary = Some(boundary);
        self
    }

    /// Credentials the broker may attach.
    #[must_use]
    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    /// Who confirms gated actions. Without one, gated actions are refused.
    #[must_use]
    pub fn approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Where audit write failures go. Defaults to [`LogAlarm`].
    #[must_use]
    pub fn alarm(mut self, alarm: Arc<dyn AuditAlarm>) -> Self {
        self.alarm = alarm;
        self
    }

    /// Register an external tool host.
    #[must_use]
    pub fn tool_host(mut self, host: Arc<dyn ExternalToolHost>) -> Self {
        self.hosts.push(host);
        self
    }

    /// Key for signing capability tokens. Defaults to a fresh key.
    #[must_use]
    pub fn token_key(mut self, key: KeyPair) -> Self {
        self.token_key = Some(key);
        self
    }

    /// Build the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary is invalid, two tool hosts share a
    /// name or the HTTP client cannot be created.
    pub fn build(self) -> BrokerResult<ToolBroker> {
        let boundary = match self.boundary {
            Some(boundary) => boundary,
            None => ExternalBoundary::unrestricted(
                std::env::current_dir().map_err(|e| BrokerError::Boundary(
                    quiver_policy::PolicyError::InvalidRoot(e.to_string()),
                ))?,
            ),
        };
        boundary.validate()?;

        let mut hosts = HashMap::new();
        for host in self.hosts {
            let name = host.name().to_owned();
            if hosts.insert(name.clone(), host).is_some() {
                return Err(BrokerError::DuplicateHost(name));
            }
        }

        // Redirects are not followed: the target of a redirect was never
        // evaluated by the policy engine and would receive the credentials.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.sandbox.default_timeout)
            .build()
            .map_err(|e| BrokerError::Http(e.to_string()))?;

        let global_max = self.config.global_max.max(1);
        let mut config = self.config;
        config.per_capability_max = config.per_capability_max.max(1);

        info!(
            global_max,
            per_capability_max = config.per_capability_max,
            credentials = self.credentials.len(),
            tool_hosts = hosts.len(),
            "tool broker ready"
        );
        Ok(ToolBroker {
            inner: Arc::new(Inner {
                config,
                sandbox: SandboxRuntime::new(self.sandbox),
                credentials: Arc::new(self.credentials),
                hosts,
                token_key: self.token_key.unwrap_or_else(KeyPair::generate),
                http,
                audit: self.audit,
                alarm: self.alarm,
                audit_failures: AtomicU64::new(0),
                boundary: RwLock::new(boundary),
                approver: self.approver,
                global: Arc::new(Semaphore::new(global_max)),
                per_capability: DashMap::new(),
                inflight: DashMap::new(),
            }),
        })
    }
}
