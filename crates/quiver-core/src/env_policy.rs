//! Environment handed to sandboxed processes.
//!
//! Nothing is inherited implicitly. A child starts from an empty environment
//! and receives [`base_env`]: a few locale and identity variables copied
//! from the host plus a fixed `PATH`. The sandbox then layers its own
//! `QUIVER_*` protocol variables on top. Credentials never appear here.

/// Host variables a child may see.
pub const INHERITED_ENV_VARS: &[&str] = &["USER", "LANG", "LC_ALL", "LC_CTYPE", "TERM", "TZ"];

/// The only `PATH` a child ever sees.
pub const SAFE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Allowlisted host variables that are set, followed by `PATH`.
#[must_use]
pub fn base_env() -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = INHERITED_ENV_VARS
        .iter()
        .filter_map(|&name| {
            std::env::var(name)
                .ok()
                .map(|value| (name.to_owned(), value))
        })
        .collect();
    env.push(("PATH".to_owned(), SAFE_PATH.to_owned()));
    env
}
