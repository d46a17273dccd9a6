//! Sandbox runtime settings.

use std::time::Duration;

use quiver_package::RuntimeKind;

/// OS isolation wrapped around the interpreter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Isolation {
    /// A plain child process in its own process group.
    #[default]
    Process,
    /// Linux bubblewrap: read-only host, writable package root, private
    /// `/tmp`, no network namespace sharing beyond what the broker proxies.
    Bubblewrap,
}

/// Per-process resource limits, applied with `setrlimit` before exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// CPU time in seconds (`RLIMIT_CPU`).
    pub cpu_secs: u64,
    /// Address space in bytes (`RLIMIT_AS`).
    pub memory_bytes: u64,
    /// Largest file the process may create (`RLIMIT_FSIZE`).
    pub file_size_bytes: u64,
    /// Open file descriptors (`RLIMIT_NOFILE`).
    pub open_files: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_secs: 120,
            memory_bytes: 2_147_483_648,
            file_size_bytes: 268_435_456,
            open_files: 256,
        }
    }
}

/// Interpreter commands per runtime kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreters {
    /// Python interpreter.
    pub python: String,
    /// Node.js interpreter.
    pub node: String,
    /// POSIX shell.
    pub shell: String,
}

impl Default for Interpreters {
    fn default() -> Self {
        Self {
            python: "python3".to_owned(),
            node: "node".to_owned(),
            shell: "sh".to_owned(),
        }
    }
}

impl Interpreters {
    /// Command for `kind`.
    #[must_use]
    pub fn for_runtime(&self, kind: RuntimeKind) -> &str {
        match kind {
            RuntimeKind::Python => &self.python,
            RuntimeKind::Node => &self.node,
            RuntimeKind::Shell => &self.shell,
        }
    }
}

/// Settings for [`crate::SandboxRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Timeout when the tool declares none.
    pub default_timeout: Duration,
    /// Upper bound on any declared timeout.
    pub max_timeout: Duration,
    /// Time the process and its cleanup hook get after SIGTERM.
    pub cleanup_grace: Duration,
    /// Byte ceiling of the diagnostic channel.
    pub diagnostic_ceiling: usize,
    /// Byte ceiling of the result channel.
    pub result_ceiling: usize,
    /// OS isolation.
    pub isolation: Isolation,
    /// Resource limits; `None` leaves the host's limits in place.
    pub limits: Option<ResourceLimits>,
    /// Interpreter commands.
    pub interpreters: Interpreters,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(600),
            cleanup_grace: Duration::from_millis(5000),
            diagnostic_ceiling: 65_536,
            result_ceiling: 1_048_576,
            isolation: Isolation::Process,
            limits: Some(ResourceLimits::default()),
            interpreters: Interpreters::default(),
        }
    }
}

impl SandboxConfig {
    /// Effective timeout for a tool declaring `declared` seconds.
    #[must_use]
    pub fn timeout_for(&self, declared: Option<u64>) -> Duration {
        declared
            .map_or(self.default_timeout, Duration::from_secs)
            .min(self.max_timeout)
    }

    /// Set the default timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the cleanup grace period.
    #[must_use]
    pub fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Set both channel ceilings.
    #[must_use]
    pub fn with_ceilings(mut self, diagnostic: usize, result: usize) -> Self {
        self.diagnostic_ceiling = diagnostic;
        self.result_ceiling = result;
        self
    }
}
