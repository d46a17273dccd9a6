//! Post-merge validation.
//!
//! Runs after every layer has been merged, so a value is judged in its final
//! form regardless of which file supplied it.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::ValidationError`] found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_runtime(config)?;
    validate_limits(config)?;
    validate_concurrency(config)?;
    validate_policy(config)?;
    validate_credentials(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_runtime(config: &Config) -> ConfigResult<()> {
    let rt = &config.runtime;
    if rt.default_timeout_secs == 0 {
        return Err(invalid("runtime.default_timeout_secs", "must be > 0"));
    }
    if rt.max_timeout_secs < rt.default_timeout_secs {
        return Err(invalid(
            "runtime.max_timeout_secs",
            format!(
                "must be >= default_timeout_secs ({})",
                rt.default_timeout_secs
            ),
        ));
    }
    if rt.cleanup_grace_ms == 0 {
        return Err(invalid("runtime.cleanup_grace_ms", "must be > 0"));
    }
    if rt.diagnostic_ceiling_bytes == 0 {
        return Err(invalid("runtime.diagnostic_ceiling_bytes", "must be > 0"));
    }
    if rt.result_ceiling_bytes == 0 {
        return Err(invalid("runtime.result_ceiling_bytes", "must be > 0"));
    }
    for (field, value) in [
        ("runtime.python", &rt.python),
        ("runtime.node", &rt.node),
        ("runtime.shell", &rt.shell),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(field, "interpreter must not be empty"));
        }
    }
    Ok(())
}

fn validate_limits(config: &Config) -> ConfigResult<()> {
    let limits = &config.limits;
    if limits.cpu_secs == 0 {
        return Err(invalid("limits.cpu_secs", "must be > 0"));
    }
    if limits.open_files < 16 {
        return Err(invalid(
            "limits.open_files",
            "must be >= 16 so interpreters can start",
        ));
    }
    Ok(())
}

fn validate_concurrency(config: &Config) -> ConfigResult<()> {
    let c = &config.concurrency;
    if c.global_max == 0 {
        return Err(invalid("concurrency.global_max", "must be > 0"));
    }
    if c.per_capability_max == 0 {
        return Err(invalid("concurrency.per_capability_max", "must be > 0"));
    }
    if c.per_capability_max > c.global_max {
        return Err(invalid(
            "concurrency.per_capability_max",
            format!("must be <= global_max ({})", c.global_max),
        ));
    }
    Ok(())
}

fn validate_policy(config: &Config) -> ConfigResult<()> {
    if config.policy.token_ttl_secs == 0 {
        return Err(invalid("policy.token_ttl_secs", "must be > 0"));
    }
    if config.policy.confirmation_timeout_secs == 0 {
        return Err(invalid("policy.confirmation_timeout_secs", "must be > 0"));
    }
    Ok(())
}

fn validate_credentials(config: &Config) -> ConfigResult<()> {
    for (name, cred) in &config.credentials {
        if cred.env.trim().is_empty() {
            return Err(invalid(
                &format!("credentials.{name}.env"),
                "must name an environment variable",
            ));
        }
        if cred.header.trim().is_empty() {
            return Err(invalid(
                &format!("credentials.{name}.header"),
                "must not be empty",
            ));
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'", config.logging.level),
        ));
    }
    let format = config.logging.format.to_ascii_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!("unknown format '{}'", config.logging.format),
        ));
    }
    Ok(())
}
