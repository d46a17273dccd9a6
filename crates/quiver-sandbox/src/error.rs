//! Sandbox error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::SandboxState;

/// Errors raised while preparing or driving a sandboxed process.
///
/// Execution failures that reach the caller are envelopes, not these; a
/// `SandboxError` is converted into a `tool_execution` envelope by the runner.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The interpreter for a runtime could not be found.
    #[error("interpreter `{0}` not found on PATH")]
    InterpreterNotFound(String),

    /// The isolation wrapper could not be found.
    #[error("isolation wrapper `{0}` not found on PATH")]
    IsolationUnavailable(String),

    /// The process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed.
        program: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A state transition the lifecycle does not allow.
    #[error("illegal sandbox transition {from} -> {to}")]
    IllegalTransition {
        /// Current state.
        from: SandboxState,
        /// Requested state.
        to: SandboxState,
    },

    /// The tool is not part of the package.
    #[error("tool `{0}` not found in package")]
    UnknownTool(String),

    /// I/O error on the process pipes.
    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
