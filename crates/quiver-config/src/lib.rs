//! Runtime settings for Quiver, merged from TOML layers.
//!
//! Layers, later ones winning:
//!
//! 1. `defaults.toml` embedded in the binary
//! 2. `/etc/quiver/config.toml`
//! 3. `~/.quiver/config.toml`
//! 4. the file given with `--config`
//!
//! `QUIVER_*` environment variables fill only fields that no file set.
//! The merged tree is validated before it is returned.
//!
//! ```rust,no_run
//! use quiver_config::Config;
//!
//! let loaded = Config::load(None).unwrap();
//! println!("cleanup grace: {} ms", loaded.config.runtime.cleanup_grace_ms);
//! ```
//!
//! Nothing here knows the domain types. The broker bridge and the CLI turn
//! sections into boundaries, credentials and sandbox limits.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::Path;

/// Load and validation failures.
pub mod error;
/// Layer discovery and merging.
pub mod loader;
pub mod prelude;
/// Section structs.
pub mod types;
/// Cross-field checks on a merged config.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadedConfig;
pub use types::*;

impl Config {
    /// Merge every layer, with `explicit` on top when given.
    ///
    /// # Errors
    ///
    /// A layer that cannot be read or parsed, or a merged config that fails
    /// validation.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<LoadedConfig> {
        loader::load(explicit, None)
    }

    /// [`Config::load`] with `home` standing in for the user's home directory.
    ///
    /// # Errors
    ///
    /// As for [`Config::load`].
    pub fn load_with_home(explicit: Option<&Path>, home: &Path) -> ConfigResult<LoadedConfig> {
        loader::load(explicit, Some(home))
    }

    /// One file over the embedded defaults, ignoring system and user layers.
    ///
    /// # Errors
    ///
    /// A missing, unreadable or invalid file.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// TOML text over the embedded defaults.
    ///
    /// # Errors
    ///
    /// Malformed TOML or an invalid result.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        loader::load_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_layer_read_from_given_home() {
        let home = tempfile::TempDir::new().unwrap();
        let loaded = Config::load_with_home(None, home.path()).unwrap();
        assert!(!loaded.loaded_files.iter().any(|f| f.contains(".quiver")));

        std::fs::create_dir_all(home.path().join(".quiver")).unwrap();
        std::fs::write(
            home.path().join(".quiver/config.toml"),
            "[selection]\nthreshold = 7\n",
        )
        .unwrap();
        let loaded = Config::load_with_home(None, home.path()).unwrap();
        assert_eq!(loaded.config.selection.threshold, 7);
        assert!(loaded.loaded_files.iter().any(|f| f.contains(".quiver")));
    }
}
