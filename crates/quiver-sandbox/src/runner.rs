//! The sandbox runtime: one isolated process per request.

use std::process::Stdio;
use std::time::{Duration, Instant};

use quiver_core::{CallId, ErrorKind, ExecutionError, ExecutionResult};
use quiver_package::ToolDefinition;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{BoundedBuffer, CappedLine, REDACTION_SLACK, cap_payload, read_capped_line};
use crate::command;
use crate::config::SandboxConfig;
use crate::normalize::{RawOutput, normalize};
use crate::protocol::{
    BrokerCall, BrokerPort, CallResponse, Frame, InvokeFrame, RESULT_PREFIX, classify,
};
use crate::redact::Redactor;
use crate::request::ExecutionRequest;
use crate::state::{SandboxState, StateMachine};

/// How long output may keep arriving after the process has exited.
const EXIT_DRAIN: Duration = Duration::from_millis(500);

/// Everything the runtime observed about one execution.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// The canonical result.
    pub result: ExecutionResult,
    /// Lifecycle states in the order they were entered.
    pub states: Vec<SandboxState>,
    /// Diagnostic output (redacted, bounded).
    pub diagnostics: String,
    /// How many times the cleanup hook was started.
    pub cleanup_invocations: u32,
    /// Exit status, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Broker calls the process made.
    pub calls: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct StreamLine {
    stream: Stream,
    line: CappedLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Exited,
    Cancelled,
    TimedOut,
}

impl Ending {
    fn reason(self) -> &'static str {
        match self {
            Self::Exited => "exited",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timeout",
        }
    }
}

/// Runs tool implementations in isolated child processes.
#[derive(Debug, Clone, Default)]
pub struct SandboxRuntime {
    config: SandboxConfig,
}

/// Per-run bookkeeping.
struct Run<'a> {
    request: &'a ExecutionRequest,
    tool: &'a ToolDefinition,
    machine: StateMachine,
    diagnostics: BoundedBuffer,
    result: Option<(String, usize)>,
    calls: CallId,
    cleanup_invocations: u32,
    exit_code: Option<i32>,
    started: Instant,
}

impl Run<'_> {
    fn enter(&mut self, state: SandboxState) {
        if let Err(e) = self.machine.transition(state) {
            warn!(request_id = %self.request.request_id, error = %e, "sandbox state machine rejected transition");
        }
    }

    fn finish(self, result: ExecutionResult) -> SandboxOutcome {
        info!(
            request_id = %self.request.request_id,
            tool = %self.request.tool,
            ok = result.is_ok(),
            duration_ms = result.metrics().duration_ms,
            calls = self.calls.0,
            "sandbox execution finished"
        );
        SandboxOutcome {
            result,
            states: self.machine.into_visited(),
            diagnostics: self.diagnostics.finish(),
            cleanup_invocations: self.cleanup_invocations,
            exit_code: self.exit_code,
            calls: self.calls.0,
        }
    }

    fn fail(mut self, kind: ErrorKind, message: impl Into<String>) -> SandboxOutcome {
        let elapsed = self.started.elapsed();
        if !self.machine.current().is_terminal() {
            self.enter(SandboxState::Terminated);
        }
        self.finish(ExecutionResult::failure(ExecutionError::new(kind, message), elapsed))
    }
}

impl SandboxRuntime {
    /// Create a runtime.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Runtime settings.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `request` to completion.
    ///
    /// Never fails: every outcome, including spawn failures, cancellation and
    /// timeout, is carried by the returned [`SandboxOutcome::result`].
    pub async fn run(
        &self,
        request: &ExecutionRequest,
        port: &dyn BrokerPort,
        redactor: &dyn Redactor,
    ) -> SandboxOutcome {
        let started = Instant::now();
        let tool = match request.definition() {
            Ok(tool) => tool,
            Err(e) => {
                let mut machine = StateMachine::new();
                let _ = machine.transition(SandboxState::Terminated);
                return SandboxOutcome {
                    result: ExecutionResult::failure(
                        ExecutionError::new(ErrorKind::InvalidRequest, e.to_string()),
                        started.elapsed(),
                    ),
                    states: machine.into_visited(),
                    diagnostics: String::new(),
                    cleanup_invocations: 0,
                    exit_code: None,
                    calls: 0,
                };
            },
        };
        let mut run = Run {
            request,
            tool,
            machine: StateMachine::new(),
            diagnostics: BoundedBuffer::new(self.config.diagnostic_ceiling),
            result: None,
            calls: CallId(0),
            cleanup_invocations: 0,
            exit_code: None,
            started,
        };

        if request.cancel.is_cancelled() {
            debug!(request_id = %request.request_id, "cancelled before spawn");
            run.enter(SandboxState::Cancelling);
            return run.fail(ErrorKind::Cancelled, "execution cancelled before it started");
        }

        let binding = &tool.implementation;
        let spec = match command::build(
            &self.config,
            binding.runtime,
            &request.package.root,
            &binding.entrypoint,
            self.protocol_env(request, tool, None),
        ) {
            Ok(spec) => spec,
            Err(e) => return run.fail(ErrorKind::ToolExecution, e.to_string()),
        };
        let mut child = match command::to_command(&spec, &self.config).spawn() {
            Ok(child) => child,
            Err(e) => {
                return run.fail(
                    ErrorKind::ToolExecution,
                    format!("failed to spawn {}: {e}", spec.program.display()),
                );
            },
        };
        run.enter(SandboxState::Running);
        let group = child.id();
        info!(
            request_id = %request.request_id,
            capability = %request.package.name(),
            tool = %request.tool,
            pid = child.id(),
            "sandbox process started"
        );

        let mut stdin = child.stdin.take();
        let (tx, mut rx) = mpsc::channel::<StreamLine>(64);
        // Lines carry slack past the ceilings; the ceilings apply after redaction.
        let line_cap = self
            .config
            .result_ceiling
            .saturating_add(RESULT_PREFIX.len())
            .saturating_add(REDACTION_SLACK);
        let mut readers: Vec<JoinHandle<()>> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Stream::Stdout, line_cap, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                stderr,
                Stream::Stderr,
                self.config.diagnostic_ceiling.saturating_add(REDACTION_SLACK),
                tx.clone(),
            ));
        }
        drop(tx);

        let timeout = self.config.timeout_for(binding.timeout);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let drain = tokio::time::sleep(timeout);
        tokio::pin!(drain);
        let mut exited = false;

        let invoke = InvokeFrame::new(
            request.request_id,
            &request.tool,
            binding.handler.as_deref(),
            request.arguments.clone(),
        )
        .to_line();
        // A process that never reads stdin must not stall the deadline.
        tokio::select! {
            () = write_line(&mut stdin, &invoke) => {},
            () = request.cancel.cancelled() => {},
            () = &mut deadline => {},
        }

        // Process exit ends the run even while a leftover child holds the pipes.
        let ending = 'io: loop {
            let next = tokio::select! {
                () = request.cancel.cancelled(), if !exited => break 'io Ending::Cancelled,
                () = &mut deadline, if !exited => break 'io Ending::TimedOut,
                () = &mut drain, if exited => break 'io Ending::Exited,
                status = child.wait(), if !exited => {
                    exited = true;
                    run.exit_code = status.ok().and_then(|s| s.code());
                    debug!(request_id = %request.request_id, exit_code = ?run.exit_code, "sandbox process exited");
                    signal_group(group, GroupSignal::Kill);
                    if let Some(until) = tokio::time::Instant::now().checked_add(EXIT_DRAIN) {
                        drain.as_mut().reset(until);
                    }
                    continue;
                },
                next = rx.recv() => next,
            };
            let Some(StreamLine { stream, line }) = next else {
                break 'io Ending::Exited;
            };
            if stream == Stream::Stderr {
                run.diagnostics.push_line(&redactor.redact(&line.text), line.dropped);
                continue;
            }
            match classify(&line.text) {
                Frame::Result(payload) if run.result.is_none() => {
                    let (kept, cut) = cap_payload(&redactor.redact(payload), self.config.result_ceiling);
                    run.result = Some((kept, cut.saturating_add(line.dropped)));
                },
                Frame::Call(payload) => {
                    run.calls = run.calls.next();
                    let response = match BrokerCall::parse(payload) {
                        Ok(call) => {
                            debug!(
                                request_id = %request.request_id,
                                call_id = %run.calls,
                                operation = call.operation(),
                                "broker call"
                            );
                            tokio::select! {
                                () = request.cancel.cancelled() => break 'io Ending::Cancelled,
                                () = &mut deadline => break 'io Ending::TimedOut,
                                response = port.handle_call(request.request_id, run.calls, call) => response,
                            }
                        },
                        Err(e) => CallResponse::error(
                            ErrorKind::InvalidRequest,
                            format!("malformed broker call: {e}"),
                        ),
                    };
                    let response = response.to_line();
                    tokio::select! {
                        () = write_line(&mut stdin, &response) => {},
                        () = request.cancel.cancelled() => break 'io Ending::Cancelled,
                        () = &mut deadline => break 'io Ending::TimedOut,
                    }
                },
                // Later result frames and free text are diagnostics only.
                Frame::Result(_) | Frame::Diagnostic(_) => {
                    run.diagnostics.push_line(&redactor.redact(&line.text), line.dropped);
                },
            }
        };
        drop(stdin);

        let ending = if ending == Ending::Exited && !exited {
            tokio::select! {
                status = child.wait() => {
                    run.exit_code = status.ok().and_then(|s| s.code());
                    Ending::Exited
                },
                () = request.cancel.cancelled() => Ending::Cancelled,
                () = &mut deadline => Ending::TimedOut,
            }
        } else {
            ending
        };

        let result = match ending {
            Ending::Exited => {
                run.enter(SandboxState::Completing);
                let (payload, dropped) = run.result.take().unzip();
                let raw = RawOutput {
                    result: payload,
                    result_dropped: dropped.unwrap_or(0),
                    exit_code: run.exit_code,
                };
                normalize(&raw, tool.output_schema.as_ref(), started.elapsed())
            },
            Ending::Cancelled | Ending::TimedOut => {
                if ending == Ending::Cancelled {
                    warn!(request_id = %request.request_id, tool = %request.tool, "execution cancelled");
                    run.enter(SandboxState::Cancelling);
                } else {
                    warn!(
                        request_id = %request.request_id,
                        tool = %request.tool,
                        timeout_secs = timeout.as_secs(),
                        "execution timed out"
                    );
                    run.enter(SandboxState::TimedOut);
                }
                self.terminate(&mut run, &mut child, ending).await;
                let (kind, message) = if ending == Ending::Cancelled {
                    (ErrorKind::Cancelled, "execution cancelled by the host".to_owned())
                } else {
                    (
                        ErrorKind::Timeout,
                        format!("execution exceeded its {}s timeout", timeout.as_secs()),
                    )
                };
                ExecutionResult::failure(ExecutionError::new(kind, message), started.elapsed())
            },
        };

        for reader in readers {
            reader.abort();
        }
        run.enter(SandboxState::Terminated);
        run.finish(result)
    }

    /// Stop a process that is being cancelled or timed out.
    ///
    /// SIGTERM goes to the whole process group, the cleanup hook (if any)
    /// starts exactly once, and both get the grace period to finish before
    /// SIGKILL.
    async fn terminate(&self, run: &mut Run<'_>, child: &mut Child, ending: Ending) {
        signal_group(child.id(), GroupSignal::Terminate);

        let tool = run.tool;
        let mut cleanup = tool
            .implementation
            .cleanup
            .as_deref()
            .and_then(|script| self.spawn_cleanup(run, script, ending));
        if cleanup.is_some() {
            run.cleanup_invocations = run.cleanup_invocations.saturating_add(1);
        }

        let graceful = tokio::time::timeout(self.config.cleanup_grace, async {
            let status = child.wait().await;
            if let Some(hook) = cleanup.as_mut() {
                let _ = hook.wait().await;
            }
            status
        })
        .await;

        match graceful {
            Ok(status) => {
                run.exit_code = status.ok().and_then(|s| s.code());
            },
            Err(_) => {
                debug!(request_id = %run.request.request_id, "grace period elapsed, killing");
                signal_group(child.id(), GroupSignal::Kill);
                let _ = child.kill().await;
                if let Some(hook) = cleanup.as_mut() {
                    signal_group(hook.id(), GroupSignal::Kill);
                    let _ = hook.kill().await;
                }
            },
        }
    }

    fn spawn_cleanup(&self, run: &Run<'_>, script: &str, ending: Ending) -> Option<Child> {
        let binding = &run.tool.implementation;
        let spec = command::build(
            &self.config,
            binding.runtime,
            &run.request.package.root,
            script,
            self.protocol_env(run.request, run.tool, Some(ending)),
        );
        let spawned = spec.and_then(|spec| {
            let mut cmd = command::to_command(&spec, &self.config);
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            cmd.spawn().map_err(|source| crate::error::SandboxError::Spawn {
                program: spec.program.clone(),
                source,
            })
        });
        match spawned {
            Ok(child) => {
                debug!(request_id = %run.request.request_id, script, "cleanup hook started");
                Some(child)
            },
            Err(e) => {
                warn!(request_id = %run.request.request_id, error = %e, "cleanup hook failed to start");
                None
            },
        }
    }

    fn protocol_env(
        &self,
        request: &ExecutionRequest,
        tool: &ToolDefinition,
        ending: Option<Ending>,
    ) -> Vec<(String, String)> {
        let mut env = vec![
            ("QUIVER_REQUEST_ID".to_owned(), request.request_id.0.to_string()),
            ("QUIVER_TRACE_ID".to_owned(), request.trace_id.0.to_string()),
            ("QUIVER_CAPABILITY".to_owned(), request.package.name().to_owned()),
            ("QUIVER_TOOL".to_owned(), tool.name.clone()),
            (
                "QUIVER_PACKAGE_ROOT".to_owned(),
                request.package.root.to_string_lossy().into_owned(),
            ),
        ];
        if let Some(handler) = &tool.implementation.handler {
            env.push(("QUIVER_HANDLER".to_owned(), handler.clone()));
        }
        if let Some(token) = &request.capability_token {
            env.push(("QUIVER_CAPABILITY_TOKEN".to_owned(), token.clone()));
        }
        if let Some(ending) = ending {
            env.push(("QUIVER_CLEANUP_REASON".to_owned(), ending.reason().to_owned()));
        }
        env
    }
}

fn spawn_reader<R>(stream: R, kind: Stream, cap: usize, tx: mpsc::Sender<StreamLine>) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        loop {
            match read_capped_line(&mut reader, cap).await {
                Ok(Some(line)) => {
                    if tx.send(StreamLine { stream: kind, line }).await.is_err() {
                        return;
                    }
                },
                Ok(None) => return,
                Err(e) => {
                    debug!(stream = ?kind, error = %e, "sandbox stream read failed");
                    return;
                },
            }
        }
    })
}

async fn write_line(stdin: &mut Option<ChildStdin>, line: &str) {
    let Some(pipe) = stdin.as_mut() else {
        return;
    };
    let written = async {
        pipe.write_all(line.as_bytes()).await?;
        pipe.flush().await
    }
    .await;
    if let Err(e) = written {
        debug!(error = %e, "sandbox stdin closed");
        *stdin = None;
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Signal the process group led by `leader`. The group outlives its leader,
/// so callers keep the id from spawn time.
#[cfg(unix)]
fn signal_group(leader: Option<u32>, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = leader.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid), signal) {
        debug!(pid, signal = ?signal, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_leader: Option<u32>, _signal: GroupSignal) {}
