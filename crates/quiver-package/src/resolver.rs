//! Tool source resolution.
//!
//! Three sources contribute tools, strictly in this order:
//!
//! 1. tools declared in the manifest,
//! 2. the derived cache artifact (`tools.json`),
//! 3. external catalogs supplied by the host.
//!
//! A cache entry that disagrees with the manifest about a tool is stale and
//! discarded; it is never merged field-by-field. Later sources never replace
//! a tool an earlier source already provided. Every discarded entry is
//! reported as a [`ToolSourceConflict`] and logged, but resolution itself
//! never fails.

use std::collections::HashSet;
use std::fmt;

use quiver_crypto::ContentHash;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::manifest::{Manifest, ToolDefinition};
use crate::parser::validate_tool;

/// File name of the derived cache artifact.
pub const CACHE_FILE_NAME: &str = "tools.json";

/// Where a resolved tool came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum ToolSource {
    /// Declared in the manifest.
    Manifest,
    /// Read from `tools.json`.
    Cache,
    /// Supplied by the named external catalog.
    Catalog(String),
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => f.write_str("manifest"),
            Self::Cache => f.write_str("cache"),
            Self::Catalog(name) => write!(f, "catalog:{name}"),
        }
    }
}

/// Why an entry was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum ConflictReason {
    /// The cache entry differs from the manifest's declaration.
    DiffersFromManifest,
    /// The manifest declares a tool list and this name is not in it.
    NotInManifest,
    /// The manifest declares a tool the cache lacks.
    MissingFromCache,
    /// An earlier source already provided this name.
    Shadowed,
    /// The entry is malformed or fails tool validation.
    Invalid(String),
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiffersFromManifest => f.write_str("differs from the manifest declaration"),
            Self::NotInManifest => f.write_str("not declared in the manifest"),
            Self::MissingFromCache => f.write_str("declared in the manifest but absent from the cache"),
            Self::Shadowed => f.write_str("already provided by an earlier source"),
            Self::Invalid(detail) => write!(f, "invalid entry: {detail}"),
        }
    }
}

/// A discarded or disagreeing tool entry. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSourceConflict {
    /// Tool name (or the cache file name when the whole artifact is bad).
    pub tool: String,
    /// Source of the discarded entry.
    pub source: ToolSource,
    /// Reason it was discarded.
    pub reason: ConflictReason,
}

impl fmt::Display for ToolSourceConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}: {}", self.tool, self.source, self.reason)
    }
}

/// A tool in the canonical list, tagged with its source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTool {
    /// The definition.
    pub definition: ToolDefinition,
    /// Where it came from.
    pub source: ToolSource,
}

/// Canonical tool list plus the conflicts found on the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    /// Ordered tools: manifest order, then cache order, then catalog order.
    pub tools: Vec<ResolvedTool>,
    /// Discarded entries.
    pub conflicts: Vec<ToolSourceConflict>,
}

impl Resolution {
    /// The definitions alone, in canonical order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    fn conflict(&mut self, tool: impl Into<String>, source: ToolSource, reason: ConflictReason) {
        let conflict = ToolSourceConflict {
            tool: tool.into(),
            source,
            reason,
        };
        warn!(
            tool = %conflict.tool,
            source = %conflict.source,
            reason = %conflict.reason,
            "discarding tool entry"
        );
        self.conflicts.push(conflict);
    }
}

/// An external supplier of tool definitions.
pub trait ToolCatalog: Send + Sync {
    /// Catalog name used in conflict reports.
    fn name(&self) -> &str;

    /// Tools this catalog offers for `package`.
    fn tools_for(&self, package: &str) -> Vec<ToolDefinition>;
}

/// Contents of the cache artifact as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheFile {
    /// No `tools.json` in the package.
    Missing,
    /// The file exists but is not a JSON array.
    Malformed(String),
    /// Raw entries, validated individually during resolution.
    Entries(Vec<Value>),
}

impl CacheFile {
    /// Interpret raw file bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Array(entries)) => Self::Entries(entries),
            Ok(_) => Self::Malformed("cache artifact must be a JSON array".to_owned()),
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

/// Structural digest of a tool definition.
fn digest(tool: &ToolDefinition) -> Option<ContentHash> {
    ContentHash::of_json(tool).ok()
}

/// Resolve the canonical tool list.
#[must_use]
pub fn resolve(manifest: &Manifest, cache: &CacheFile, catalogs: &[&dyn ToolCatalog]) -> Resolution {
    let mut resolution = Resolution::default();
    let mut names: HashSet<String> = HashSet::new();

    for tool in manifest.declared_tools() {
        names.insert(tool.name.clone());
        resolution.tools.push(ResolvedTool {
            definition: tool.clone(),
            source: ToolSource::Manifest,
        });
    }

    match cache {
        CacheFile::Missing => {},
        CacheFile::Malformed(detail) => resolution.conflict(
            CACHE_FILE_NAME,
            ToolSource::Cache,
            ConflictReason::Invalid(detail.clone()),
        ),
        CacheFile::Entries(entries) => {
            resolve_cache(manifest, entries, &mut names, &mut resolution);
        },
    }

    for catalog in catalogs {
        let source = ToolSource::Catalog(catalog.name().to_owned());
        for tool in catalog.tools_for(&manifest.name) {
            if names.contains(&tool.name) {
                resolution.conflict(tool.name, source.clone(), ConflictReason::Shadowed);
                continue;
            }
            if let Err(e) = validate_tool(&tool, &tool.name) {
                resolution.conflict(tool.name, source.clone(), ConflictReason::Invalid(e.to_string()));
                continue;
            }
            names.insert(tool.name.clone());
            resolution.tools.push(ResolvedTool {
                definition: tool,
                source: source.clone(),
            });
        }
    }

    resolution
}

fn resolve_cache(
    manifest: &Manifest,
    entries: &[Value],
    names: &mut HashSet<String>,
    resolution: &mut Resolution,
) {
    let declared = manifest.tools.is_some();
    let mut seen_in_cache: HashSet<String> = HashSet::new();

    for (i, entry) in entries.iter().enumerate() {
        let label = entry
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| format!("{CACHE_FILE_NAME}[{i}]"), str::to_owned);

        let tool: ToolDefinition = match serde_json::from_value(entry.clone()) {
            Ok(tool) => tool,
            Err(e) => {
                resolution.conflict(label, ToolSource::Cache, ConflictReason::Invalid(e.to_string()));
                continue;
            },
        };

        if !seen_in_cache.insert(tool.name.clone()) {
            resolution.conflict(label, ToolSource::Cache, ConflictReason::Shadowed);
            continue;
        }

        if let Some(declared_tool) = manifest.declared_tools().iter().find(|t| t.name == tool.name) {
            let same = match (digest(declared_tool), digest(&tool)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if !same {
                resolution.conflict(label, ToolSource::Cache, ConflictReason::DiffersFromManifest);
            }
            continue;
        }

        if declared {
            resolution.conflict(label, ToolSource::Cache, ConflictReason::NotInManifest);
            continue;
        }

        if let Err(e) = validate_tool(&tool, &format!("{CACHE_FILE_NAME}[{i}]")) {
            resolution.conflict(label, ToolSource::Cache, ConflictReason::Invalid(e.to_string()));
            continue;
        }
        names.insert(tool.name.clone());
        resolution.tools.push(ResolvedTool {
            definition: tool,
            source: ToolSource::Cache,
        });
    }
}

/// Manifest tools the cache does not mention.
pub(crate) fn missing_from_cache(manifest: &Manifest, cache: &CacheFile) -> Vec<ToolSourceConflict> {
    let CacheFile::Entries(entries) = cache else {
        return Vec::new();
    };
    let cached: HashSet<&str> = entries
        .iter()
        .filter_map(|e| e.get("name").and_then(Value::as_str))
        .collect();
    manifest
        .declared_tools()
        .iter()
        .filter(|t| !cached.contains(t.name.as_str()))
        .map(|t| ToolSourceConflict {
            tool: t.name.clone(),
            source: ToolSource::Cache,
            reason: ConflictReason::MissingFromCache,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_manifest;
    use serde_json::json;

    fn manifest(tools: &str) -> Manifest {
        let content = format!(
            "---\nspec_version: \"1\"\nname: pdf-tools\ndescription: PDF\nversion: \"1\"\n{tools}---\n"
        );
        parse_manifest(&content).unwrap().0
    }

    const EXTRACT: &str = r"tools:
  - name: extract-text
    description: Extract text
    input_schema:
      type: object
      properties:
        path: { type: string }
    implementation: { runtime: python, entrypoint: extract.py }
";

    fn cache_tool(name: &str, schema: Value) -> Value {
        json!({
            "name": name,
            "description": "Extract text",
            "input_schema": schema,
            "implementation": {"runtime": "python", "entrypoint": "extract.py"}
        })
    }

    struct StaticCatalog(Vec<ToolDefinition>);

    impl ToolCatalog for StaticCatalog {
        fn name(&self) -> &str {
            "static"
        }

        fn tools_for(&self, _package: &str) -> Vec<ToolDefinition> {
            self.0.clone()
        }
    }

    #[test]
    fn test_manifest_wins_over_conflicting_cache() {
        let m = manifest(EXTRACT);
        let cache = CacheFile::Entries(vec![cache_tool(
            "extract-text",
            json!({"type": "object", "properties": {"file": {"type": "integer"}}}),
        )]);
        let res = resolve(&m, &cache, &[]);
        assert_eq!(res.tools.len(), 1);
        assert_eq!(res.tools[0].source, ToolSource::Manifest);
        assert_eq!(res.tools[0].definition, m.declared_tools()[0]);
        assert_eq!(res.conflicts.len(), 1);
        assert_eq!(res.conflicts[0].reason, ConflictReason::DiffersFromManifest);
    }

    #[test]
    fn test_matching_cache_entry_is_silent() {
        let m = manifest(EXTRACT);
        let entry = serde_json::to_value(&m.declared_tools()[0]).unwrap();
        let res = resolve(&m, &CacheFile::Entries(vec![entry]), &[]);
        assert_eq!(res.tools.len(), 1);
        assert!(res.conflicts.is_empty());
    }

    #[test]
    fn test_orphan_cache_entries_discarded_when_tools_declared() {
        let m = manifest(EXTRACT);
        let cache = CacheFile::Entries(vec![cache_tool("other-tool", json!({"type": "object"}))]);
        let res = resolve(&m, &cache, &[]);
        assert_eq!(res.tools.len(), 1);
        assert_eq!(res.conflicts[0].reason, ConflictReason::NotInManifest);
    }

    #[test]
    fn test_cache_used_when_manifest_omits_tools() {
        let m = manifest("");
        let cache = CacheFile::Entries(vec![
            cache_tool("extract-text", json!({"type": "object"})),
            json!({"name": "broken"}),
        ]);
        let res = resolve(&m, &cache, &[]);
        assert_eq!(res.tools.len(), 1);
        assert_eq!(res.tools[0].source, ToolSource::Cache);
        assert!(matches!(res.conflicts[0].reason, ConflictReason::Invalid(_)));
    }

    #[test]
    fn test_malformed_cache_reported() {
        let m = manifest(EXTRACT);
        let res = resolve(&m, &CacheFile::from_bytes(b"{not json"), &[]);
        assert_eq!(res.tools.len(), 1);
        assert_eq!(res.conflicts[0].tool, CACHE_FILE_NAME);
    }

    #[test]
    fn test_catalog_never_overrides() {
        let m = manifest(EXTRACT);
        let shadow: ToolDefinition =
            serde_json::from_value(cache_tool("extract-text", json!({"type": "object"}))).unwrap();
        let extra: ToolDefinition =
            serde_json::from_value(cache_tool("summarize", json!({"type": "object"}))).unwrap();
        let catalog = StaticCatalog(vec![shadow, extra]);
        let res = resolve(&m, &CacheFile::Missing, &[&catalog]);
        let names: Vec<_> = res.tools.iter().map(|t| t.definition.name.as_str()).collect();
        assert_eq!(names, vec!["extract-text", "summarize"]);
        assert_eq!(res.tools[0].source, ToolSource::Manifest);
        assert_eq!(res.tools[1].source, ToolSource::Catalog("static".to_owned()));
        assert_eq!(res.conflicts[0].reason, ConflictReason::Shadowed);
    }

    #[test]
    fn test_missing_from_cache() {
        let m = manifest(EXTRACT);
        let missing = missing_from_cache(&m, &CacheFile::Entries(Vec::new()));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].reason, ConflictReason::MissingFromCache);
    }
}
