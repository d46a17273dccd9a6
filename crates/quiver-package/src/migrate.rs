//! Manifest schema migration.
//!
//! Older manifests are upgraded by an explicit, field-by-field rewrite of the
//! raw frontmatter before typed parsing. A manifest is never reinterpreted
//! under a schema it was not written for.

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{ManifestErrorKind, ManifestValidationError};
use crate::manifest::CURRENT_SPEC_VERSION;

/// Legacy schema version upgraded by [`migrate_v0`].
pub const LEGACY_SPEC_VERSION: &str = "0";

/// Read `spec_version`, accepting a string or an integer.
pub(crate) fn spec_version_of(frontmatter: &Mapping) -> Result<String, ManifestValidationError> {
    match frontmatter.get("spec_version") {
        None | Some(Value::Null) => Err(ManifestValidationError::missing("spec_version")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ManifestValidationError::missing("spec_version"))
        },
        Some(Value::String(s)) => Ok(s.trim().to_owned()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(ManifestValidationError::malformed(
            "spec_version",
            "must be a string such as \"1\"",
        )),
    }
}

/// Bring a frontmatter mapping up to [`CURRENT_SPEC_VERSION`].
///
/// # Errors
///
/// Returns `unknown-schema-version` for versions with no migration path, or a
/// validation error when legacy fields have the wrong shape.
pub fn upgrade(frontmatter: Mapping) -> Result<Mapping, ManifestValidationError> {
    let version = spec_version_of(&frontmatter)?;
    match version.as_str() {
        CURRENT_SPEC_VERSION => Ok(frontmatter),
        LEGACY_SPEC_VERSION => migrate_v0(frontmatter),
        other => Err(ManifestValidationError::new(
            ManifestErrorKind::UnknownSchemaVersion,
            "spec_version",
            format!("unknown spec_version `{other}`; supported: {LEGACY_SPEC_VERSION}, {CURRENT_SPEC_VERSION}"),
        )),
    }
}

/// Rewrite a version `0` frontmatter into the version `1` shape.
///
/// | v0 | v1 |
/// |---|---|
/// | `allowed_hosts` | `permissions.network` |
/// | `fs.read` / `fs.write` | `permissions.fs_read` / `permissions.fs_write` |
/// | `allow_subprocess` | `permissions.process_spawn` |
/// | `keywords` | `triggers.keywords` |
///
/// # Errors
///
/// Returns `malformed-structure` when a legacy field collides with a v1 field
/// or has the wrong shape.
pub fn migrate_v0(mut fm: Mapping) -> Result<Mapping, ManifestValidationError> {
    let mut permissions = take_mapping(&mut fm, "permissions")?;
    let mut triggers = take_mapping(&mut fm, "triggers")?;

    if let Some(hosts) = fm.remove("allowed_hosts") {
        move_into(&mut permissions, "network", hosts, "allowed_hosts")?;
    }
    if let Some(fs) = fm.remove("fs") {
        let Value::Mapping(mut fs) = fs else {
            return Err(ManifestValidationError::malformed(
                "fs",
                "legacy `fs` must be a mapping with `read` and `write`",
            ));
        };
        if let Some(read) = fs.remove("read") {
            move_into(&mut permissions, "fs_read", read, "fs.read")?;
        }
        if let Some(write) = fs.remove("write") {
            move_into(&mut permissions, "fs_write", write, "fs.write")?;
        }
        if let Some((key, _)) = fs.into_iter().next() {
            return Err(ManifestValidationError::malformed(
                format!("fs.{}", key.as_str().unwrap_or("?")),
                "unknown key in legacy `fs` block",
            ));
        }
    }
    if let Some(spawn) = fm.remove("allow_subprocess") {
        move_into(&mut permissions, "process_spawn", spawn, "allow_subprocess")?;
    }
    if let Some(keywords) = fm.remove("keywords") {
        move_into(&mut triggers, "keywords", keywords, "keywords")?;
    }

    if !permissions.is_empty() {
        fm.insert(Value::from("permissions"), Value::Mapping(permissions));
    }
    if !triggers.is_empty() {
        fm.insert(Value::from("triggers"), Value::Mapping(triggers));
    }
    fm.insert(
        Value::from("spec_version"),
        Value::from(CURRENT_SPEC_VERSION),
    );
    debug!(from = LEGACY_SPEC_VERSION, to = CURRENT_SPEC_VERSION, "migrated manifest");
    Ok(fm)
}

fn take_mapping(fm: &mut Mapping, key: &str) -> Result<Mapping, ManifestValidationError> {
    match fm.remove(key) {
        None | Some(Value::Null) => Ok(Mapping::new()),
        Some(Value::Mapping(m)) => Ok(m),
        Some(_) => Err(ManifestValidationError::malformed(key, "must be a mapping")),
    }
}

fn move_into(
    target: &mut Mapping,
    key: &str,
    value: Value,
    legacy: &str,
) -> Result<(), ManifestValidationError> {
    if target.contains_key(key) {
        return Err(ManifestValidationError::malformed(
            legacy,
            format!("legacy field conflicts with `{key}` already present"),
        ));
    }
    target.insert(Value::from(key), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_current_version_passthrough() {
        let fm = mapping("spec_version: \"1\"\nname: a\n");
        assert_eq!(upgrade(fm.clone()).unwrap(), fm);
    }

    #[test]
    fn test_integer_version_accepted() {
        let fm = mapping("spec_version: 1\nname: a\n");
        assert!(upgrade(fm).is_ok());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = upgrade(mapping("spec_version: \"7\"\n")).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::UnknownSchemaVersion);
        assert_eq!(err.field, "spec_version");
    }

    #[test]
    fn test_missing_version() {
        let err = upgrade(mapping("name: a\n")).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MissingRequiredField);
        assert_eq!(err.field, "spec_version");
    }

    #[test]
    fn test_migrate_v0_moves_fields() {
        let fm = mapping(
            r#"
spec_version: "0"
name: legacy
allowed_hosts: [api.example.com]
fs:
  read: ["docs/**"]
  write: ["out/*"]
allow_subprocess: true
keywords: [pdf]
"#,
        );
        let out = upgrade(fm).unwrap();
        assert_eq!(out.get("spec_version").unwrap().as_str(), Some("1"));
        assert!(out.get("allowed_hosts").is_none());
        assert!(out.get("fs").is_none());
        let perms = out.get("permissions").unwrap();
        assert_eq!(perms["network"][0].as_str(), Some("api.example.com"));
        assert_eq!(perms["fs_read"][0].as_str(), Some("docs/**"));
        assert_eq!(perms["fs_write"][0].as_str(), Some("out/*"));
        assert_eq!(perms["process_spawn"].as_bool(), Some(true));
        assert_eq!(
            out.get("triggers").unwrap()["keywords"][0].as_str(),
            Some("pdf")
        );
    }

    #[test]
    fn test_migrate_v0_conflict() {
        let fm = mapping(
            r#"
spec_version: "0"
allowed_hosts: [a.example.com]
permissions:
  network: [b.example.com]
"#,
        );
        let err = upgrade(fm).unwrap_err();
        assert_eq!(err.kind, ManifestErrorKind::MalformedStructure);
        assert_eq!(err.field, "allowed_hosts");
    }
}
