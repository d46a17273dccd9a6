//! Loading, resolving, caching, discovering and exporting packages.

mod common;

use quiver_package::{
    CACHE_FILE_NAME, CacheStatus, ManifestErrorKind, McpBinding, OpenAiBinding, ToolHostBinding,
    check_cache, discover_headers, discover_packages, load_header, load_package, parse_manifest,
    write_cache,
};
use quiver_test::{PackageFixture, ToolFixture, result_script};
use serde_json::json;

const REQUIRED: [&str; 4] = ["spec_version", "name", "description", "version"];

#[test]
fn test_missing_required_field_rejected_whole() {
    for field in REQUIRED {
        let mut fixture = PackageFixture::new("pdf-tools")
            .tool(ToolFixture::shell("extract-text", "exit 0\n"))
            .manifest_text();
        let line = fixture
            .lines()
            .find(|l| l.starts_with(&format!("{field}:")))
            .unwrap()
            .to_owned();
        fixture = fixture.replacen(&format!("{line}\n"), "", 1);

        let err = parse_manifest(&fixture).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MissingRequiredField, "{field}");
        assert_eq!(err.field, field);
    }
}

#[test]
fn test_invalid_package_leaves_nothing_loaded() {
    let dirs = common::Dirs::new();
    PackageFixture::new("good")
        .tool(ToolFixture::shell("run", "exit 0\n"))
        .write(dirs.packages());
    PackageFixture::new("broken")
        .field("surprise", json!(true))
        .write(dirs.packages());

    let err = load_package(&dirs.packages().join("broken")).unwrap_err();
    assert_eq!(
        err.manifest_error().unwrap().kind,
        ManifestErrorKind::MalformedStructure
    );

    let loaded = discover_packages(dirs.packages()).unwrap();
    let names: Vec<_> = loaded.iter().map(|p| p.name().to_owned()).collect();
    assert_eq!(names, vec!["good"]);
}

#[test]
fn test_manifest_wins_over_conflicting_cache() {
    let dirs = common::Dirs::new();
    let manifest_schema = json!({
        "type": "object",
        "properties": { "path": { "type": "string" } },
        "required": ["path"]
    });
    let dir = PackageFixture::new("pdf-tools")
        .tool(
            ToolFixture::shell("extract-text", &result_script(&json!({})))
                .input_schema(manifest_schema.clone()),
        )
        .write(dirs.packages());

    let stale = json!([{
        "name": "extract-text",
        "description": "Old extractor",
        "input_schema": { "type": "object", "properties": { "file": { "type": "integer" } } },
        "implementation": { "runtime": "shell", "entrypoint": "scripts/extract-text.sh" }
    }]);
    std::fs::write(dir.join(CACHE_FILE_NAME), stale.to_string()).unwrap();

    let package = load_package(&dir).unwrap();
    assert_eq!(package.tools.len(), 1);
    assert_eq!(package.tool("extract-text").unwrap().input_schema, manifest_schema);

    assert!(matches!(check_cache(&dir).unwrap(), CacheStatus::Stale { .. }));
    write_cache(&dir).unwrap();
    assert_eq!(check_cache(&dir).unwrap(), CacheStatus::Fresh);
}

#[test]
fn test_cache_regeneration_is_byte_identical() {
    let dirs = common::Dirs::new();
    let dir = PackageFixture::new("pdf-tools")
        .tool(
            ToolFixture::shell("extract-text", "exit 0\n")
                .input_schema(json!({"type": "object", "properties": {"z": {}, "a": {}}})),
        )
        .tool(ToolFixture::shell("merge", "exit 0\n"))
        .write(dirs.packages());

    let path = write_cache(&dir).unwrap().unwrap();
    let first = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    write_cache(&dir).unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);

    // Unchanged manifest: nothing to write.
    assert!(write_cache(&dir).unwrap().is_none());
}

#[test]
fn test_cache_only_package_is_unmanaged() {
    let dirs = common::Dirs::new();
    let dir = PackageFixture::new("legacy")
        .without_tools()
        .write(dirs.packages());
    std::fs::create_dir_all(dir.join("scripts")).unwrap();
    std::fs::write(dir.join("scripts/run.sh"), "exit 0\n").unwrap();
    let cached = json!([{
        "name": "run",
        "description": "Run",
        "input_schema": { "type": "object" },
        "implementation": { "runtime": "shell", "entrypoint": "scripts/run.sh" }
    }]);
    std::fs::write(dir.join(CACHE_FILE_NAME), cached.to_string()).unwrap();

    assert_eq!(check_cache(&dir).unwrap(), CacheStatus::Unmanaged);
    assert!(write_cache(&dir).unwrap().is_none());
    assert!(load_package(&dir).unwrap().tool("run").is_some());
}

#[test]
fn test_headers_load_without_tools() {
    let dirs = common::Dirs::new();
    let dir = PackageFixture::new("pdf-tools")
        .keywords(&["pdf"])
        .tool(ToolFixture::shell("extract-text", "exit 0\n"))
        .write(dirs.packages());
    // A broken tool script path does not matter for the header.
    std::fs::remove_dir_all(dir.join("scripts")).unwrap();

    let header = load_header(&dir).unwrap();
    assert_eq!(header.name, "pdf-tools");
    assert_eq!(header.triggers.keywords, vec!["pdf"]);

    let headers = discover_headers(dirs.packages()).unwrap();
    assert_eq!(headers.len(), 1);
}

#[test]
fn test_host_overlays_apply_per_host() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("pdf-tools")
        .tool(ToolFixture::shell("extract-text", "exit 0\n"))
        .tool(ToolFixture::shell("merge", "exit 0\n"))
        .field(
            "hosts",
            json!({ "mcp": { "tool_prefix": "pdf_", "disabled_tools": ["merge"] } }),
        )
        .load(dirs.packages());

    let mcp = McpBinding.export(&package);
    assert_eq!(mcp.len(), 1);
    assert_eq!(mcp[0]["name"], "pdf_extract-text");
    assert!(McpBinding.resolve(&package, "pdf_extract-text").is_some());
    assert!(McpBinding.resolve(&package, "pdf_merge").is_none());

    let openai = OpenAiBinding.export(&package);
    assert_eq!(openai.len(), 2);
}

#[test]
fn test_legacy_manifest_upgraded_on_load() {
    let dirs = common::Dirs::new();
    let dir = PackageFixture::new("legacy")
        .field("spec_version", json!("0"))
        .field("keywords", json!(["pdf"]))
        .field("allowed_hosts", json!(["api.example.com"]))
        .field("fs", json!({ "read": ["docs/**"] }))
        .write(dirs.packages());

    let package = load_package(&dir).unwrap();
    assert_eq!(package.manifest.spec_version, "1");
    assert_eq!(package.permissions().network, vec!["api.example.com"]);
    assert_eq!(package.permissions().fs_read, vec!["docs/**"]);
    assert_eq!(package.header().triggers.keywords, vec!["pdf"]);

    let unknown = PackageFixture::new("future")
        .field("spec_version", json!("7"))
        .write(dirs.packages());
    let err = load_package(&unknown).unwrap_err();
    assert_eq!(
        err.manifest_error().unwrap().kind,
        ManifestErrorKind::UnknownSchemaVersion
    );
}
