//! Capability package manifest types.
//!
//! A manifest (`SKILL.md`) is a YAML frontmatter block followed by free-form
//! instructions. The frontmatter is a closed set of typed, optional blocks
//! behind a `spec_version` discriminator; only `extensions` is free-form.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Manifest file name at the root of every package.
pub const MANIFEST_FILE_NAME: &str = "SKILL.md";

/// Current manifest schema version.
pub const CURRENT_SPEC_VERSION: &str = "1";

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Interpreter family an implementation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Python scripts (`.py`).
    Python,
    /// Node.js scripts (`.js`, `.mjs`, `.cjs`).
    Node,
    /// POSIX shell scripts (`.sh`).
    Shell,
}

impl RuntimeKind {
    /// File extensions accepted for entrypoints of this runtime.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py"],
            Self::Node => &["js", "mjs", "cjs"],
            Self::Shell => &["sh"],
        }
    }

    /// Whether `path` carries an extension this runtime accepts.
    #[must_use]
    pub fn accepts(self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().contains(&ext))
    }

    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Node => "node",
            Self::Shell => "shell",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a tool is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImplementationBinding {
    /// Interpreter family.
    pub runtime: RuntimeKind,
    /// Script path relative to the package root.
    pub entrypoint: String,
    /// Function or subcommand inside the entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Wall-clock timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Interpreter-level dependencies the script expects to be installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Cleanup hook run once after cancellation or timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,
}

/// How strongly a tool asks for confirmation before it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationLevel {
    /// Never ask.
    #[default]
    None,
    /// Ask when the host runs with strict confirmation.
    Recommended,
    /// Always ask.
    Required,
}

/// Tool-level confirmation requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Confirmation {
    /// Strength of the requirement.
    #[serde(default)]
    pub level: ConfirmationLevel,
    /// Prompt shown to the approver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// One declared, schema-bound operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolDefinition {
    /// Tool name, unique within the package.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Object-typed JSON Schema for the arguments.
    pub input_schema: Value,
    /// JSON Schema for the structured result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Execution binding.
    pub implementation: ImplementationBinding,
    /// Confirmation requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,
}

impl ToolDefinition {
    /// Confirmation level, `None` when undeclared.
    #[must_use]
    pub fn confirmation_level(&self) -> ConfirmationLevel {
        self.confirmation
            .as_ref()
            .map_or(ConfirmationLevel::None, |c| c.level)
    }
}

/// Declared filesystem, network and process permissions.
///
/// An empty category grants nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionSet {
    /// Root-relative globs the package may read.
    #[serde(default)]
    pub fs_read: Vec<String>,
    /// Root-relative globs the package may write.
    #[serde(default)]
    pub fs_write: Vec<String>,
    /// Outbound network allow-entries.
    #[serde(default)]
    pub network: Vec<String>,
    /// Whether the package may spawn processes.
    #[serde(default)]
    pub process_spawn: bool,
}

/// Action categories a safety policy can gate behind confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Reading a file.
    FilesystemRead,
    /// Writing a new file.
    FilesystemWrite,
    /// Overwriting an existing file.
    DestructiveWrite,
    /// Any outbound network connection.
    ExternalNetwork,
    /// Spawning a process.
    ProcessSpawn,
    /// Invoking the tool at all.
    ToolInvocation,
}

impl ActionCategory {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilesystemRead => "filesystem_read",
            Self::FilesystemWrite => "filesystem_write",
            Self::DestructiveWrite => "destructive_write",
            Self::ExternalNetwork => "external_network",
            Self::ProcessSpawn => "process_spawn",
            Self::ToolInvocation => "tool_invocation",
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmation and redaction rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyPolicy {
    /// Categories that need an explicit approval before the broker proceeds.
    #[serde(default)]
    pub require_confirmation_for: Vec<ActionCategory>,
    /// Redact credential-shaped output.
    #[serde(default = "default_true")]
    pub redact_secrets: bool,
    /// Redact personal data (email addresses, phone numbers).
    #[serde(default)]
    pub redact_pii: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            require_confirmation_for: Vec::new(),
            redact_secrets: true,
            redact_pii: false,
        }
    }
}

impl SafetyPolicy {
    /// Whether `category` is gated.
    #[must_use]
    pub fn requires(&self, category: ActionCategory) -> bool {
        self.require_confirmation_for.contains(&category)
    }
}

/// Selection metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionTrigger {
    /// Words whose mention in a task selects the package.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// File extensions (with or without the dot) the package handles.
    #[serde(default)]
    pub file_types: Vec<String>,
    /// Host-derived intents the package serves.
    #[serde(default)]
    pub intents: Vec<String>,
    /// Tie-break priority; higher wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Per-host overlay applied by a [`crate::binding::ToolHostBinding`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostOverlay {
    /// Prefix prepended to every exported tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_prefix: Option<String>,
    /// Tools hidden from this host.
    #[serde(default)]
    pub disabled_tools: Vec<String>,
}

/// One example task used to check selection quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationExample {
    /// Task text.
    pub task: String,
    /// Files attached to the task.
    #[serde(default)]
    pub files: Vec<String>,
    /// Host-derived intents.
    #[serde(default)]
    pub intents: Vec<String>,
    /// Whether this package should be selected.
    #[serde(default = "default_true")]
    pub expect_selected: bool,
}

/// Evaluation hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Evaluation {
    /// Example tasks.
    #[serde(default)]
    pub examples: Vec<EvaluationExample>,
}

/// Validated manifest frontmatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    /// Schema version after migration (always [`CURRENT_SPEC_VERSION`]).
    pub spec_version: String,
    /// Package name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Package version marker.
    pub version: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Selection metadata.
    pub triggers: SelectionTrigger,
    /// Declared tools. `None` means the manifest did not declare the key.
    pub tools: Option<Vec<ToolDefinition>>,
    /// Declared permissions.
    pub permissions: PermissionSet,
    /// Safety rules.
    pub safety: SafetyPolicy,
    /// Names of broker credentials the package may use.
    pub secrets: Vec<String>,
    /// Other packages this one expects to be present.
    pub dependencies: Vec<String>,
    /// Host overlays keyed by host name.
    pub hosts: BTreeMap<String, HostOverlay>,
    /// Evaluation hints.
    pub evaluation: Evaluation,
    /// Free-form extension data.
    pub extensions: BTreeMap<String, Value>,
}

impl Manifest {
    /// Declared tools, or an empty slice.
    #[must_use]
    pub fn declared_tools(&self) -> &[ToolDefinition] {
        self.tools.as_deref().unwrap_or_default()
    }
}

/// Identity-level view of a package used before it is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageHeader {
    /// Package name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Package version marker.
    pub version: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Selection metadata.
    pub triggers: SelectionTrigger,
    /// Package directory, when loaded from disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// A fully loaded, validated capability package.
///
/// Immutable once loaded; shared as `Arc<CapabilityPackage>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityPackage {
    /// Validated manifest.
    pub manifest: Manifest,
    /// Canonical tool list after source resolution.
    pub tools: Vec<ToolDefinition>,
    /// Markdown body after the frontmatter.
    pub instructions: String,
    /// Package directory.
    pub root: PathBuf,
}

impl CapabilityPackage {
    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Declared permissions.
    #[must_use]
    pub fn permissions(&self) -> &PermissionSet {
        &self.manifest.permissions
    }

    /// Safety rules.
    #[must_use]
    pub fn safety(&self) -> &SafetyPolicy {
        &self.manifest.safety
    }

    /// Identity-level view.
    #[must_use]
    pub fn header(&self) -> PackageHeader {
        PackageHeader {
            name: self.manifest.name.clone(),
            description: self.manifest.description.clone(),
            version: self.manifest.version.clone(),
            tags: self.manifest.tags.clone(),
            triggers: self.manifest.triggers.clone(),
            root: Some(self.root.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_extensions() {
        assert!(RuntimeKind::Python.accepts("scripts/run.py"));
        assert!(RuntimeKind::Node.accepts("index.mjs"));
        assert!(RuntimeKind::Node.accepts("index.cjs"));
        assert!(RuntimeKind::Shell.accepts("run.sh"));
        assert!(!RuntimeKind::Shell.accepts("run.py"));
        assert!(!RuntimeKind::Python.accepts("run"));
    }

    #[test]
    fn test_safety_defaults() {
        let safety: SafetyPolicy = serde_json::from_str("{}").unwrap();
        assert!(safety.redact_secrets);
        assert!(!safety.redact_pii);
        assert!(safety.require_confirmation_for.is_empty());
    }

    #[test]
    fn test_action_category_wire_names() {
        let json = serde_json::to_string(&ActionCategory::DestructiveWrite).unwrap();
        assert_eq!(json, "\"destructive_write\"");
        let back: ActionCategory = serde_json::from_str("\"external_network\"").unwrap();
        assert_eq!(back, ActionCategory::ExternalNetwork);
    }

    #[test]
    fn test_tool_serialization_skips_empty_optionals() {
        let tool = ToolDefinition {
            name: "extract-text".to_owned(),
            description: "Extract text".to_owned(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            implementation: ImplementationBinding {
                runtime: RuntimeKind::Python,
                entrypoint: "scripts/extract.py".to_owned(),
                handler: None,
                timeout: None,
                dependencies: Vec::new(),
                cleanup: None,
            },
            confirmation: None,
        };
        let json = serde_json::to_value(&tool).unwrap();
        assert!(json.get("output_schema").is_none());
        assert!(json["implementation"].get("handler").is_none());
        assert_eq!(tool.confirmation_level(), ConfirmationLevel::None);
    }
}
