//! `SKILL.md` parser and validator.
//!
//! Parsing is pure: bytes in, a validated [`Manifest`] or a field-specific
//! [`ManifestValidationError`] out. Validation runs in a fixed order and
//! stops at the first failure, so a manifest is never partially accepted.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use globset::GlobBuilder;
use quiver_core::validate_name;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::ManifestValidationError;
use crate::manifest::{
    CapabilityPackage, Evaluation, HostOverlay, MAX_DESCRIPTION_LEN, Manifest, PackageHeader,
    PermissionSet, SafetyPolicy, SelectionTrigger, ToolDefinition,
};
use crate::migrate;
use crate::network::NetworkEntry;
use crate::schema;

/// Top-level frontmatter keys understood by schema version 1.
const KNOWN_KEYS: &[&str] = &[
    "spec_version",
    "name",
    "description",
    "version",
    "tags",
    "triggers",
    "tools",
    "permissions",
    "safety",
    "secrets",
    "dependencies",
    "hosts",
    "evaluation",
    "extensions",
];

/// Split a manifest into its YAML frontmatter and markdown body.
///
/// # Errors
///
/// Returns `malformed-structure` when either delimiter line is missing.
pub fn split_frontmatter(content: &str) -> Result<(&str, &str), ManifestValidationError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = strip_delimiter_line(content) else {
        return Err(ManifestValidationError::malformed(
            "frontmatter",
            "manifest must start with a `---` line",
        ));
    };

    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset.saturating_add(line.len())..];
            return Ok((yaml, body));
        }
        offset = offset.saturating_add(line.len());
    }
    Err(ManifestValidationError::malformed(
        "frontmatter",
        "missing closing `---` line",
    ))
}

fn strip_delimiter_line(content: &str) -> Option<&str> {
    let (first, rest) = match content.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (content, ""),
    };
    (first.trim_end() == "---").then_some(rest)
}

/// Parse and validate manifest text, returning the manifest and its body.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn parse_manifest(content: &str) -> Result<(Manifest, String), ManifestValidationError> {
    let (yaml, body) = split_frontmatter(content)?;
    let frontmatter = migrate::upgrade(parse_mapping(yaml)?)?;

    let name = required_string(&frontmatter, "name")?;
    let description = required_string(&frontmatter, "description")?;
    let version = required_string(&frontmatter, "version")?;

    reject_unknown_keys(&frontmatter)?;

    let manifest = Manifest {
        spec_version: migrate::spec_version_of(&frontmatter)?,
        name,
        description,
        version,
        tags: block(&frontmatter, "tags")?.unwrap_or_default(),
        triggers: block::<SelectionTrigger>(&frontmatter, "triggers")?.unwrap_or_default(),
        tools: tools_block(&frontmatter)?,
        permissions: block::<PermissionSet>(&frontmatter, "permissions")?.unwrap_or_default(),
        safety: block::<SafetyPolicy>(&frontmatter, "safety")?.unwrap_or_default(),
        secrets: block(&frontmatter, "secrets")?.unwrap_or_default(),
        dependencies: block(&frontmatter, "dependencies")?.unwrap_or_default(),
        hosts: block::<BTreeMap<String, HostOverlay>>(&frontmatter, "hosts")?.unwrap_or_default(),
        evaluation: block::<Evaluation>(&frontmatter, "evaluation")?.unwrap_or_default(),
        extensions: block(&frontmatter, "extensions")?.unwrap_or_default(),
    };

    validate_manifest(&manifest)?;
    Ok((manifest, body.trim().to_owned()))
}

/// Parse raw package bytes into a validated package rooted at `root`.
///
/// The tool list is the manifest's own; source resolution against the cache
/// and catalogs happens in [`crate::loader`].
///
/// # Errors
///
/// Returns the first validation failure, including a package name that does
/// not match the directory name of `root`.
pub fn parse_package(bytes: &[u8], root: &Path) -> Result<CapabilityPackage, ManifestValidationError> {
    let content = std::str::from_utf8(bytes).map_err(|e| {
        ManifestValidationError::malformed("frontmatter", format!("manifest is not UTF-8: {e}"))
    })?;
    let (manifest, instructions) = parse_manifest(content)?;
    check_directory_name(&manifest.name, root)?;
    Ok(CapabilityPackage {
        tools: manifest.declared_tools().to_vec(),
        manifest,
        instructions,
        root: root.to_path_buf(),
    })
}

/// Parse only the identity-level fields of a manifest.
///
/// Tools, schemas and permissions are not validated; they are checked when
/// the package is fully loaded.
///
/// # Errors
///
/// Returns the first failure among frontmatter structure, schema version,
/// required fields, name pattern and trigger shape.
pub fn parse_header(content: &str) -> Result<PackageHeader, ManifestValidationError> {
    let (yaml, _) = split_frontmatter(content)?;
    let frontmatter = migrate::upgrade(parse_mapping(yaml)?)?;

    let name = required_string(&frontmatter, "name")?;
    validate_name(&name).map_err(|e| ManifestValidationError::pattern("name", e.to_string()))?;
    let description = required_string(&frontmatter, "description")?;
    check_description("description", &description)?;

    Ok(PackageHeader {
        name,
        description,
        version: required_string(&frontmatter, "version")?,
        tags: block(&frontmatter, "tags")?.unwrap_or_default(),
        triggers: block(&frontmatter, "triggers")?.unwrap_or_default(),
        root: None,
    })
}

/// Check the package name against the name of its directory.
///
/// # Errors
///
/// Returns `pattern-mismatch` on `name` when they differ.
pub fn check_directory_name(name: &str, root: &Path) -> Result<(), ManifestValidationError> {
    let Some(dir_name) = root.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    if dir_name == name {
        Ok(())
    } else {
        Err(ManifestValidationError::pattern(
            "name",
            format!("package name `{name}` does not match directory `{dir_name}`"),
        ))
    }
}

fn parse_mapping(yaml: &str) -> Result<Mapping, ManifestValidationError> {
    let value: YamlValue = serde_yaml::from_str(yaml).map_err(|e| {
        ManifestValidationError::malformed("frontmatter", format!("invalid YAML: {e}"))
    })?;
    let YamlValue::Mapping(mapping) = value else {
        return Err(ManifestValidationError::malformed(
            "frontmatter",
            "frontmatter must be a mapping",
        ));
    };
    if let Some((key, _)) = mapping.iter().find(|(k, _)| !k.is_string()) {
        return Err(ManifestValidationError::malformed(
            "frontmatter",
            format!("non-string key {key:?}"),
        ));
    }
    Ok(mapping)
}

fn required_string(fm: &Mapping, key: &str) -> Result<String, ManifestValidationError> {
    match fm.get(key) {
        None | Some(YamlValue::Null) => Err(ManifestValidationError::missing(key)),
        Some(YamlValue::String(s)) if s.trim().is_empty() => {
            Err(ManifestValidationError::missing(key))
        },
        Some(YamlValue::String(s)) => Ok(s.trim().to_owned()),
        Some(YamlValue::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(ManifestValidationError::malformed(key, "must be a string")),
    }
}

fn reject_unknown_keys(fm: &Mapping) -> Result<(), ManifestValidationError> {
    for key in fm.keys() {
        let key = key.as_str().unwrap_or_default();
        if !KNOWN_KEYS.contains(&key) {
            return Err(ManifestValidationError::malformed(
                key,
                format!(
                    "unknown top-level key `{key}`; put free-form data under `extensions`"
                ),
            ));
        }
    }
    Ok(())
}

fn block<T: DeserializeOwned>(fm: &Mapping, key: &str) -> Result<Option<T>, ManifestValidationError> {
    match fm.get(key) {
        None | Some(YamlValue::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|e| ManifestValidationError::malformed(key, e.to_string())),
    }
}

fn tools_block(fm: &Mapping) -> Result<Option<Vec<ToolDefinition>>, ManifestValidationError> {
    let seq = match fm.get("tools") {
        None | Some(YamlValue::Null) => return Ok(None),
        Some(YamlValue::Sequence(seq)) => seq,
        Some(_) => {
            return Err(ManifestValidationError::malformed(
                "tools",
                "must be a list of tool definitions",
            ));
        },
    };
    seq.iter()
        .enumerate()
        .map(|(i, value)| {
            serde_yaml::from_value(value.clone())
                .map_err(|e| ManifestValidationError::malformed(format!("tools[{i}]"), e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn validate_manifest(manifest: &Manifest) -> Result<(), ManifestValidationError> {
    validate_name(&manifest.name)
        .map_err(|e| ManifestValidationError::pattern("name", e.to_string()))?;
    check_description("description", &manifest.description)?;

    let mut seen = HashSet::new();
    for (i, tool) in manifest.declared_tools().iter().enumerate() {
        let prefix = format!("tools[{i}]");
        validate_tool(tool, &prefix)?;
        if !seen.insert(tool.name.as_str()) {
            return Err(ManifestValidationError::pattern(
                format!("{prefix}.name"),
                format!("duplicate tool name `{}`", tool.name),
            ));
        }
    }

    validate_permissions(&manifest.permissions)?;

    for (field, names) in [
        ("secrets", &manifest.secrets),
        ("dependencies", &manifest.dependencies),
    ] {
        for (i, name) in names.iter().enumerate() {
            validate_name(name).map_err(|e| {
                ManifestValidationError::pattern(format!("{field}[{i}]"), e.to_string())
            })?;
        }
    }

    for (host, overlay) in &manifest.hosts {
        validate_name(host).map_err(|e| {
            ManifestValidationError::pattern(format!("hosts.{host}"), e.to_string())
        })?;
        let bad_prefix = overlay.tool_prefix.as_ref().is_some_and(|prefix| {
            !prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        });
        if bad_prefix {
            return Err(ManifestValidationError::pattern(
                format!("hosts.{host}.tool_prefix"),
                "prefix may only contain [a-z0-9_-]",
            ));
        }
    }

    for (i, example) in manifest.evaluation.examples.iter().enumerate() {
        if example.task.trim().is_empty() {
            return Err(ManifestValidationError::missing(format!(
                "evaluation.examples[{i}].task"
            )));
        }
    }

    for (i, file_type) in manifest.triggers.file_types.iter().enumerate() {
        if file_type.trim_start_matches('.').trim().is_empty() {
            return Err(ManifestValidationError::pattern(
                format!("triggers.file_types[{i}]"),
                "file type must not be empty",
            ));
        }
    }
    Ok(())
}

fn check_description(field: &str, description: &str) -> Result<(), ManifestValidationError> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(ManifestValidationError::pattern(
            field,
            format!("description is {len} characters, maximum is {MAX_DESCRIPTION_LEN}"),
        ));
    }
    Ok(())
}

/// Validate one tool definition, reporting fields under `prefix`.
///
/// Used for manifest tools and for tools arriving from the cache or catalogs.
///
/// # Errors
///
/// Returns the first failing rule.
pub fn validate_tool(tool: &ToolDefinition, prefix: &str) -> Result<(), ManifestValidationError> {
    validate_name(&tool.name)
        .map_err(|e| ManifestValidationError::pattern(format!("{prefix}.name"), e.to_string()))?;
    if tool.description.trim().is_empty() {
        return Err(ManifestValidationError::missing(format!(
            "{prefix}.description"
        )));
    }
    check_description(&format!("{prefix}.description"), &tool.description)?;

    if !schema::is_object_schema(&tool.input_schema) {
        return Err(ManifestValidationError::pattern(
            format!("{prefix}.input_schema"),
            "input_schema must describe an object",
        ));
    }
    schema::compile_schema(&tool.input_schema)
        .map_err(|e| ManifestValidationError::pattern(format!("{prefix}.input_schema"), e))?;
    if let Some(output) = &tool.output_schema {
        schema::compile_schema(output)
            .map_err(|e| ManifestValidationError::pattern(format!("{prefix}.output_schema"), e))?;
    }

    let binding = &tool.implementation;
    let runtime = binding.runtime;
    for (field, script) in [
        ("entrypoint", Some(&binding.entrypoint)),
        ("cleanup", binding.cleanup.as_ref()),
    ] {
        let Some(script) = script else { continue };
        let field = format!("{prefix}.implementation.{field}");
        check_contained(&field, script)?;
        if !runtime.accepts(script) {
            return Err(ManifestValidationError::pattern(
                field,
                format!(
                    "`{script}` does not match runtime `{runtime}` (expected .{})",
                    runtime.extensions().join(", .")
                ),
            ));
        }
    }
    if binding.timeout == Some(0) {
        return Err(ManifestValidationError::pattern(
            format!("{prefix}.implementation.timeout"),
            "timeout must be greater than zero",
        ));
    }
    if binding
        .handler
        .as_ref()
        .is_some_and(|h| h.trim().is_empty())
    {
        return Err(ManifestValidationError::missing(format!(
            "{prefix}.implementation.handler"
        )));
    }
    Ok(())
}

/// Reject scripts that would resolve outside the package root.
fn check_contained(field: &str, script: &str) -> Result<(), ManifestValidationError> {
    if script.trim().is_empty() {
        return Err(ManifestValidationError::missing(field));
    }
    if script.contains('\\') {
        return Err(ManifestValidationError::pattern(
            field,
            "paths use `/` separators",
        ));
    }
    let contained = Path::new(script)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if contained {
        Ok(())
    } else {
        Err(ManifestValidationError::pattern(
            field,
            format!("`{script}` must be a relative path inside the package"),
        ))
    }
}

fn validate_permissions(perms: &PermissionSet) -> Result<(), ManifestValidationError> {
    for (category, globs) in [("fs_read", &perms.fs_read), ("fs_write", &perms.fs_write)] {
        for (i, pattern) in globs.iter().enumerate() {
            let field = format!("permissions.{category}[{i}]");
            check_glob(&field, pattern)?;
        }
    }
    for (i, entry) in perms.network.iter().enumerate() {
        if entry.starts_with('!') {
            return Err(ManifestValidationError::pattern(
                format!("permissions.network[{i}]"),
                "negation patterns are not supported",
            ));
        }
        NetworkEntry::parse(entry).map_err(|e| {
            ManifestValidationError::pattern(format!("permissions.network[{i}]"), e)
        })?;
    }
    Ok(())
}

fn check_glob(field: &str, pattern: &str) -> Result<(), ManifestValidationError> {
    if pattern.starts_with('!') {
        return Err(ManifestValidationError::pattern(
            field,
            "negation patterns are not supported",
        ));
    }
    if pattern.trim().is_empty() {
        return Err(ManifestValidationError::pattern(field, "empty pattern"));
    }
    if pattern.starts_with('/') || pattern.split('/').any(|seg| seg == "..") {
        return Err(ManifestValidationError::pattern(
            field,
            "patterns are root-relative and may not contain `..`",
        ));
    }
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|_| ())
        .map_err(|e| ManifestValidationError::pattern(field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManifestErrorKind;

    const VALID: &str = r#"---
spec_version: "1"
name: pdf-tools
description: Extract text and metadata from PDF files
version: 1.2.0
tags: [documents]
triggers:
  keywords: [pdf, extract]
  file_types: [".pdf"]
  priority: 5
tools:
  - name: extract-text
    description: Extract plain text from a PDF
    input_schema:
      type: object
      properties:
        path: { type: string }
      required: [path]
    output_schema:
      type: object
    implementation:
      runtime: python
      entrypoint: scripts/extract.py
      handler: main
      timeout: 20
permissions:
  fs_read: ["**/*.pdf"]
  network: ["api.example.com", "*.cdn.example.com"]
safety:
  require_confirmation_for: [destructive_write]
extensions:
  x-team: docs
---

# PDF tools

Use `extract-text` for plain text.
"#;

    fn with(frontmatter_edit: impl Fn(&str) -> String) -> String {
        frontmatter_edit(VALID)
    }

    #[test]
    fn test_parse_valid_manifest() {
        let (manifest, body) = parse_manifest(VALID).unwrap();
        assert_eq!(manifest.name, "pdf-tools");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.declared_tools().len(), 1);
        assert_eq!(manifest.triggers.priority, Some(5));
        assert_eq!(manifest.permissions.fs_read, vec!["**/*.pdf"]);
        assert!(manifest.safety.redact_secrets);
        assert!(manifest.extensions.contains_key("x-team"));
        assert!(body.starts_with("# PDF tools"));
    }

    #[test]
    fn test_missing_required_fields_are_named() {
        for field in ["name", "description", "version"] {
            let content: String = VALID
                .lines()
                .filter(|l| !l.starts_with(&format!("{field}:")))
                .map(|l| format!("{l}\n"))
                .collect();
            let err = parse_manifest(&content).unwrap_err();
            assert_eq!(err.kind, ManifestErrorKind::MissingRequiredField, "{field}");
            assert_eq!(err.field, field);
        }
    }

    #[test]
    fn test_missing_delimiters() {
        let err = parse_manifest("name: x\n").unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MalformedStructure);
        let err = parse_manifest("---\nname: x\n").unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MalformedStructure);
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let content = with(|s| s.replace("tags: [documents]", "tags: [documents]\nauthor: me"));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MalformedStructure);
        assert_eq!(err.field, "author");
    }

    #[test]
    fn test_unknown_nested_key_rejected() {
        let content = with(|s| s.replace("  priority: 5", "  priority: 5\n  weight: 2"));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MalformedStructure);
        assert_eq!(err.field, "triggers");
    }

    #[test]
    fn test_bad_package_name() {
        let content = with(|s| s.replace("name: pdf-tools", "name: PDF--tools"));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::PatternMismatch);
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_runtime_extension_mismatch() {
        let content = with(|s| s.replace("runtime: python", "runtime: node"));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::PatternMismatch);
        assert_eq!(err.field, "tools[0].implementation.entrypoint");
    }

    #[test]
    fn test_entrypoint_escape_rejected() {
        let content = with(|s| s.replace("scripts/extract.py", "../outside.py"));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.field, "tools[0].implementation.entrypoint");
        let content = with(|s| s.replace("scripts/extract.py", "/usr/bin/x.py"));
        assert!(parse_manifest(&content).is_err());
    }

    #[test]
    fn test_negation_glob_rejected() {
        let content = with(|s| s.replace("\"**/*.pdf\"", "\"!secret/**\""));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::PatternMismatch);
        assert_eq!(err.field, "permissions.fs_read[0]");
    }

    #[test]
    fn test_bad_network_entry() {
        let content = with(|s| s.replace("\"api.example.com\"", "\"https://api.example.com\""));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.field, "permissions.network[0]");
    }

    #[test]
    fn test_input_schema_must_be_object() {
        let content = with(|s| {
            s.replace(
                "      type: object\n      properties:",
                "      type: string\n      properties:",
            )
        });
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.field, "tools[0].input_schema");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let content = with(|s| s.replace("timeout: 20", "timeout: 0"));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.field, "tools[0].implementation.timeout");
    }

    #[test]
    fn test_description_too_long() {
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        let content = with(|s| {
            s.replace(
                "description: Extract text and metadata from PDF files",
                &format!("description: {long}"),
            )
        });
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::PatternMismatch);
        assert_eq!(err.field, "description");
    }

    #[test]
    fn test_duplicate_tool_names() {
        let tool = r"  - name: extract-text
    description: Again
    input_schema: { type: object }
    implementation: { runtime: shell, entrypoint: run.sh }
permissions:";
        let content = with(|s| s.replacen("permissions:", tool, 1));
        let err = parse_manifest(&content).unwrap_err();
        assert_eq!(err.field, "tools[1].name");
    }

    #[test]
    fn test_legacy_manifest_is_migrated() {
        let content = r"---
spec_version: 0
name: legacy-tool
description: Old style
version: 0.1.0
allowed_hosts: [api.example.com]
keywords: [legacy]
---
";
        let (manifest, _) = parse_manifest(content).unwrap();
        assert_eq!(manifest.spec_version, "1");
        assert_eq!(manifest.permissions.network, vec!["api.example.com"]);
        assert_eq!(manifest.triggers.keywords, vec!["legacy"]);
        assert!(manifest.tools.is_none());
    }

    #[test]
    fn test_parse_package_checks_directory_name() {
        let pkg = parse_package(VALID.as_bytes(), Path::new("/skills/pdf-tools")).unwrap();
        assert_eq!(pkg.name(), "pdf-tools");
        assert!(pkg.tool("extract-text").is_some());

        let err = parse_package(VALID.as_bytes(), Path::new("/skills/other")).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::PatternMismatch);
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_header_skips_tool_validation() {
        let content = with(|s| s.replace("runtime: python", "runtime: node"));
        let header = parse_header(&content).unwrap();
        assert_eq!(header.name, "pdf-tools");
        assert_eq!(header.triggers.keywords, vec!["pdf", "extract"]);
        assert!(parse_manifest(&content).is_err());
    }

    #[test]
    fn test_crlf_frontmatter() {
        let content = VALID.replace('\n', "\r\n");
        let (manifest, _) = parse_manifest(&content).unwrap();
        assert_eq!(manifest.name, "pdf-tools");
    }
}
