//! Configuration types for the Quiver runtime.
//!
//! Types here depend on nothing else in the workspace. Domain types are
//! mirrored and converted at the integration boundary (the broker bridge and
//! the CLI). Every struct implements [`Default`] with the same values as the
//! embedded `defaults.toml`, so a bare `[section]` header is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration, resolved once at process start and passed by
/// reference to every component that needs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Sandbox runtime behaviour.
    pub runtime: RuntimeSection,
    /// Per-process resource limits.
    pub limits: LimitsSection,
    /// Concurrency ceilings.
    pub concurrency: ConcurrencySection,
    /// Selection engine tuning.
    pub selection: SelectionSection,
    /// Host-imposed permission boundary.
    pub boundary: BoundarySection,
    /// Broker policy knobs.
    pub policy: PolicySection,
    /// Audit log persistence.
    pub audit: AuditSection,
    /// Named credentials held by the broker.
    pub credentials: BTreeMap<String, CredentialSection>,
    /// Logging.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// OS isolation applied around each sandbox process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Plain child process with a cleared environment and resource limits.
    #[default]
    Process,
    /// Additionally wrap the process in bubblewrap (Linux only).
    Bubblewrap,
}

/// Sandbox runtime behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// Timeout for tools that do not declare one.
    pub default_timeout_secs: u64,
    /// Upper bound on any tool-declared timeout.
    pub max_timeout_secs: u64,
    /// Grace period for the cleanup hook after cancellation or timeout.
    pub cleanup_grace_ms: u64,
    /// Ceiling for the diagnostic channel (stderr plus stray stdout).
    pub diagnostic_ceiling_bytes: usize,
    /// Ceiling for the single result frame.
    pub result_ceiling_bytes: usize,
    /// OS isolation mode.
    pub isolation: IsolationMode,
    /// Interpreter for `python` tools.
    pub python: String,
    /// Interpreter for `node` tools.
    pub node: String,
    /// Interpreter for `shell` tools.
    pub shell: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_timeout_secs: 600,
            cleanup_grace_ms: 5000,
            diagnostic_ceiling_bytes: 65_536,
            result_ceiling_bytes: 1_048_576,
            isolation: IsolationMode::Process,
            python: "python3".to_owned(),
            node: "node".to_owned(),
            shell: "sh".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Resource limits applied to every sandbox process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    /// CPU time in seconds.
    pub cpu_secs: u64,
    /// Address space in bytes.
    pub memory_bytes: u64,
    /// Largest file the process may write, in bytes.
    pub file_size_bytes: u64,
    /// Open file descriptors.
    pub open_files: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            cpu_secs: 120,
            memory_bytes: 2_147_483_648,
            file_size_bytes: 268_435_456,
            open_files: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Concurrency / selection
// ---------------------------------------------------------------------------

/// Concurrency ceilings enforced by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencySection {
    /// Executions in flight across all capabilities.
    pub global_max: usize,
    /// Executions in flight per capability package.
    pub per_capability_max: usize,
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            global_max: 16,
            per_capability_max: 4,
        }
    }
}

/// Selection engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionSection {
    /// Minimum score for a candidate to be selected.
    pub threshold: u32,
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

// ---------------------------------------------------------------------------
// Boundary / policy
// ---------------------------------------------------------------------------

/// Host-imposed boundary intersected with every package's permissions.
///
/// An absent list leaves that category as the package declared it; a present
/// list (even empty) narrows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundarySection {
    /// Execution root that sandbox paths are resolved against.
    pub root: Option<String>,
    /// Root-relative globs the host allows reading.
    pub fs_read: Option<Vec<String>>,
    /// Root-relative globs the host allows writing.
    pub fs_write: Option<Vec<String>>,
    /// Network allow-entries the host permits.
    pub network: Option<Vec<String>>,
    /// Whether the host permits spawning processes.
    pub process_spawn: Option<bool>,
}

/// Broker policy knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySection {
    /// Capability packages that may never execute.
    pub blocked_capabilities: Vec<String>,
    /// Tools (`capability/tool` or bare tool name) that may never execute.
    pub blocked_tools: Vec<String>,
    /// How long a confirmation may stay pending.
    pub confirmation_timeout_secs: u64,
    /// Treat `confirmation.level = "recommended"` as required.
    pub strict_confirmation: bool,
    /// Lifetime of capability tokens handed to sandboxes.
    pub token_ttl_secs: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            blocked_capabilities: Vec::new(),
            blocked_tools: Vec::new(),
            confirmation_timeout_secs: 300,
            strict_confirmation: false,
            token_ttl_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit / credentials / logging
// ---------------------------------------------------------------------------

/// Audit log persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    /// JSON-lines file to append records to. Empty keeps records in memory.
    pub path: String,
    /// Broker signing key. Empty generates an ephemeral key per process.
    pub key_path: String,
}

/// A credential the broker injects into forwarded requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialSection {
    /// Environment variable holding the secret.
    pub env: String,
    /// Hosts the credential may be sent to.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Header carrying the credential.
    #[serde(default = "default_credential_header")]
    pub header: String,
    /// Scheme prefix (`Bearer`, `token`, or empty for raw values).
    #[serde(default = "default_credential_scheme")]
    pub scheme: String,
}

fn default_credential_header() -> String {
    "authorization".to_owned()
}

fn default_credential_scheme() -> String {
    "Bearer".to_owned()
}

/// Logging level, format and per-crate directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Level filter.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Extra filter directives.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
