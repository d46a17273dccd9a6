//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/quiver/config.toml` (system)
//! 3. Merge `~/.quiver/config.toml` (user)
//! 4. Merge the file passed with `--config` (explicit)
//! 5. Apply `QUIVER_*` env var fallbacks for fields no file set
//! 6. Deserialize merged tree → `Config`
//! 7. Validate

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Environment variables consulted for fields no config file set.
const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("QUIVER_LOG_LEVEL", "logging.level"),
    ("QUIVER_LOG_FORMAT", "logging.format"),
    ("QUIVER_AUDIT_PATH", "audit.path"),
    ("QUIVER_ISOLATION", "runtime.isolation"),
];

/// A loaded configuration plus the files that contributed to it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Files merged, lowest precedence first.
    pub loaded_files: Vec<String>,
}

/// Load configuration with the full precedence chain.
///
/// `explicit` is a file named on the command line; `home_override` replaces
/// the home directory used for user-level discovery.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any file is unreadable or malformed, or the
/// merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<LoadedConfig> {
    let env_vars: BTreeMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("QUIVER_"))
        .collect();
    let home_dir = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };

    let mut merged = parse_defaults()?;
    let mut file_set = BTreeSet::new();
    let mut loaded_files = Vec::new();

    let layers = [
        ("system", Some(PathBuf::from("/etc/quiver/config.toml"))),
        ("user", Some(home_dir.join(".quiver").join("config.toml"))),
        ("explicit", explicit.map(Path::to_path_buf)),
    ];

    for (layer, path) in layers {
        let Some(path) = path else { continue };
        let overlay = if layer == "explicit" {
            Some(read_file(&path)?)
        } else {
            try_load_file(&path)?
        };
        if let Some(overlay) = overlay {
            deep_merge(&mut merged, &overlay, "", &mut file_set);
            loaded_files.push(path.display().to_string());
            info!(layer, path = %path.display(), "loaded config layer");
        }
    }

    let env_count = apply_env_fallbacks(&mut merged, &file_set, &env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config = finish(merged, "<merged config>")?;
    Ok(LoadedConfig {
        config,
        loaded_files,
    })
}

/// Load a single file layered over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = read_file(path)?;
    let mut merged = parse_defaults()?;
    deep_merge(&mut merged, &overlay, "", &mut BTreeSet::new());
    finish(merged, &path.display().to_string())
}

/// Parse TOML text layered over the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the text is malformed or fails validation.
pub fn load_str(toml_text: &str) -> ConfigResult<Config> {
    let overlay: toml::Value = toml::from_str(toml_text).map_err(|e| ConfigError::ParseError {
        path: "<inline>".to_owned(),
        source: e,
    })?;
    let mut merged = parse_defaults()?;
    deep_merge(&mut merged, &overlay, "", &mut BTreeSet::new());
    finish(merged, "<inline>")
}

fn parse_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn finish(merged: toml::Value, label: &str) -> ConfigResult<Config> {
    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: label.to_owned(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    match try_load_file(path)? {
        Some(value) => Ok(value),
        None => Err(ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }),
    }
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read so there is no window between a size check and the
/// read itself.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len(),
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Recursively merge `overlay` into `base`, recording every leaf path set.
///
/// Tables merge per key; scalars and arrays from the overlay replace.
fn deep_merge(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    set: &mut BTreeSet<String>,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match base_table.get_mut(key) {
                    Some(base_val) if overlay_val.is_table() => {
                        deep_merge(base_val, overlay_val, &path, set);
                    },
                    _ => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        set.insert(path);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            set.insert(prefix.to_owned());
        },
    }
}

fn apply_env_fallbacks(
    merged: &mut toml::Value,
    file_set: &BTreeSet<String>,
    env_vars: &BTreeMap<String, String>,
) -> usize {
    let mut applied = 0usize;
    for (var, path) in ENV_FALLBACKS {
        if file_set.contains(*path) {
            continue;
        }
        let Some(value) = env_vars.get(*var) else {
            continue;
        };
        let Some((section, key)) = path.split_once('.') else {
            continue;
        };
        if let Some(table) = merged
            .as_table_mut()
            .and_then(|t| t.get_mut(section))
            .and_then(toml::Value::as_table_mut)
        {
            table.insert(key.to_owned(), toml::Value::String(value.clone()));
            applied = applied.saturating_add(1);
        }
    }
    applied
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IsolationMode;

    #[test]
    fn test_defaults_parse() {
        let val = parse_defaults().unwrap();
        let table = val.as_table().unwrap();
        assert!(table.contains_key("runtime"));
        assert!(table.contains_key("policy"));
        assert!(table.contains_key("logging"));
    }

    #[test]
    fn test_defaults_match_default_impl() {
        let from_toml: Config = parse_defaults().unwrap().try_into().unwrap();
        assert_eq!(from_toml, Config::default());
    }

    #[test]
    fn test_load_str_overrides() {
        let config = load_str(
            r#"
            [runtime]
            cleanup_grace_ms = 250

            [boundary]
            fs_read = ["docs/**"]
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.cleanup_grace_ms, 250);
        assert_eq!(config.runtime.default_timeout_secs, 30);
        assert_eq!(config.boundary.fs_read, Some(vec!["docs/**".to_owned()]));
        assert_eq!(config.boundary.network, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = load_str("[runtime]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_file_missing() {
        let err = load_file(Path::new("/nonexistent/quiver.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_load_with_home_override() {
        let home = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join(".quiver")).unwrap();
        std::fs::write(
            home.path().join(".quiver").join("config.toml"),
            "[selection]\nthreshold = 5\n",
        )
        .unwrap();

        let explicit = home.path().join("explicit.toml");
        std::fs::write(&explicit, "[runtime]\nisolation = \"bubblewrap\"\n").unwrap();

        let loaded = load(Some(&explicit), Some(home.path())).unwrap();
        assert_eq!(loaded.config.selection.threshold, 5);
        assert_eq!(loaded.config.runtime.isolation, IsolationMode::Bubblewrap);
        assert!(loaded.loaded_files.iter().any(|f| f.ends_with("explicit.toml")));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.toml");
        let padding = format!("# {}\n", "x".repeat(1_100_000));
        std::fs::write(&path, padding).unwrap();
        assert!(matches!(
            load_file(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_env_fallback_skips_file_set_fields() {
        let mut merged = parse_defaults().unwrap();
        let mut set = BTreeSet::new();
        let overlay: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"\n").unwrap();
        deep_merge(&mut merged, &overlay, "", &mut set);

        let mut env = BTreeMap::new();
        env.insert("QUIVER_LOG_LEVEL".to_owned(), "trace".to_owned());
        env.insert("QUIVER_LOG_FORMAT".to_owned(), "json".to_owned());
        let applied = apply_env_fallbacks(&mut merged, &set, &env);
        assert_eq!(applied, 1);

        let config: Config = merged.try_into().unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "json");
    }
}
