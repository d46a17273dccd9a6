//! Building the sandboxed command line.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use quiver_core::env_policy::base_env;
use quiver_package::RuntimeKind;
use tracing::debug;

use crate::config::{Isolation, SandboxConfig};
use crate::error::{SandboxError, SandboxResult};

/// Everything needed to start one sandboxed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Resolved program.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
    /// Complete environment; nothing else is inherited.
    pub env: Vec<(String, String)>,
    /// Working directory.
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// Value of `key` in the environment.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Find `name` on the host `PATH`, or accept it when it is already a path.
///
/// # Errors
///
/// Returns [`SandboxError::InterpreterNotFound`] when nothing matches.
pub fn resolve_interpreter(name: &str) -> SandboxResult<PathBuf> {
    which::which(name).map_err(|_| SandboxError::InterpreterNotFound(name.to_owned()))
}

fn interpreter_args(kind: RuntimeKind, script: &Path) -> Vec<String> {
    let script = script.to_string_lossy().into_owned();
    match kind {
        // Unbuffered so frames reach the runtime as soon as they are printed.
        RuntimeKind::Python => vec!["-u".to_owned(), script],
        RuntimeKind::Node | RuntimeKind::Shell => vec![script],
    }
}

/// Build the command running `script` (relative to `root`) with the
/// interpreter for `kind`.
///
/// The environment starts empty: the inherited allowlist, a fixed `PATH` and
/// the `QUIVER_*` protocol variables in `protocol_env`.
///
/// # Errors
///
/// Returns an error if the interpreter or the isolation wrapper is missing.
pub fn build(
    config: &SandboxConfig,
    kind: RuntimeKind,
    root: &Path,
    script: &str,
    protocol_env: Vec<(String, String)>,
) -> SandboxResult<CommandSpec> {
    let interpreter = resolve_interpreter(config.interpreters.for_runtime(kind))?;
    let mut env = base_env();
    env.extend(protocol_env);

    let spec = CommandSpec {
        program: interpreter,
        args: interpreter_args(kind, &root.join(script)),
        env,
        cwd: root.to_path_buf(),
    };
    match config.isolation {
        Isolation::Process => Ok(spec),
        Isolation::Bubblewrap => wrap_bubblewrap(spec),
    }
}

/// Prefix the command with bubblewrap.
///
/// The host is mounted read-only, the package root is writable, `/tmp` is a
/// private tmpfs and every namespace is unshared, network included: network
/// access goes through the broker.
fn wrap_bubblewrap(inner: CommandSpec) -> SandboxResult<CommandSpec> {
    let bwrap = which::which("bwrap")
        .map_err(|_| SandboxError::IsolationUnavailable("bwrap".to_owned()))?;
    let root = inner.cwd.to_string_lossy().into_owned();
    #[rustfmt::skip]
    let mut args: Vec<String> = [
        "--ro-bind", "/", "/",                 // Read-only host for interpreters
        "--dev", "/dev",
        "--proc", "/proc",
        "--bind", root.as_str(), root.as_str(), // Writable package root
        "--tmpfs", "/tmp",                      // Private scratch space
        "--unshare-all",                        // Network goes through the broker
        "--die-with-parent",
        "--chdir", root.as_str(),
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();
    args.push(inner.program.to_string_lossy().into_owned());
    args.extend(inner.args);
    debug!(root = %root, "wrapping sandbox command in bubblewrap");
    Ok(CommandSpec {
        program: bwrap,
        args,
        env: inner.env,
        cwd: inner.cwd,
    })
}

/// Turn a spec into a spawnable command.
///
/// The child gets its own process group so signals reach every descendant,
/// all three stdio streams are piped, and the child is killed if the
/// handle is dropped.
#[must_use]
pub fn to_command(spec: &CommandSpec, config: &SandboxConfig) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .current_dir(&spec.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(limits) = config.limits {
        crate::limits::install(&mut cmd, limits);
    }
    cmd
}
