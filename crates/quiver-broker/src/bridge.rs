//! Conversion from the resolved configuration to broker and sandbox types.
//!
//! `quiver-config` knows nothing about the domain crates; this is the one
//! place its sections turn into [`SandboxConfig`], [`ExternalBoundary`],
//! [`BrokerConfig`], a [`CredentialStore`] and an [`AuditLog`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use quiver_audit::{AuditLog, AuditSink, JsonlSink, MemorySink};
use quiver_config::{Config, IsolationMode};
use quiver_crypto::KeyPair;
use quiver_policy::ExternalBoundary;
use quiver_sandbox::{Interpreters, Isolation, ResourceLimits, SandboxConfig};
use tracing::{info, warn};

use crate::broker::{ToolBroker, ToolBrokerBuilder};
use crate::config::BrokerConfig;
use crate::credentials::{Credential, CredentialStore};
use crate::error::BrokerResult;

/// Sandbox settings from `[runtime]` and `[limits]`.
#[must_use]
pub fn sandbox_config(config: &Config) -> SandboxConfig {
    let runtime = &config.runtime;
    let limits = &config.limits;
    SandboxConfig {
        default_timeout: Duration::from_secs(runtime.default_timeout_secs),
        max_timeout: Duration::from_secs(runtime.max_timeout_secs),
        cleanup_grace: Duration::from_millis(runtime.cleanup_grace_ms),
        diagnostic_ceiling: runtime.diagnostic_ceiling_bytes,
        result_ceiling: runtime.result_ceiling_bytes,
        isolation: match runtime.isolation {
            IsolationMode::Process => Isolation::Process,
            IsolationMode::Bubblewrap => Isolation::Bubblewrap,
        },
        limits: Some(ResourceLimits {
            cpu_secs: limits.cpu_secs,
            memory_bytes: limits.memory_bytes,
            file_size_bytes: limits.file_size_bytes,
            open_files: limits.open_files,
        }),
        interpreters: Interpreters {
            python: runtime.python.clone(),
            node: runtime.node.clone(),
            shell: runtime.shell.clone(),
        },
    }
}

/// The external boundary from `[boundary]`, rooted at `default_root` unless
/// the section names a root.
#[must_use]
pub fn boundary(config: &Config, default_root: &Path) -> ExternalBoundary {
    let section = &config.boundary;
    ExternalBoundary {
        root: section
            .root
            .as_ref()
            .map_or_else(|| default_root.to_path_buf(), PathBuf::from),
        fs_read: section.fs_read.clone(),
        fs_write: section.fs_write.clone(),
        network: section.network.clone(),
        process_spawn: section.process_spawn,
    }
}

/// Host policy and ceilings from `[policy]` and `[concurrency]`.
#[must_use]
pub fn broker_config(config: &Config) -> BrokerConfig {
    BrokerConfig {
        blocked_capabilities: config.policy.blocked_capabilities.clone(),
        blocked_tools: config.policy.blocked_tools.clone(),
        confirmation_timeout: Duration::from_secs(config.policy.confirmation_timeout_secs),
        strict_confirmation: config.policy.strict_confirmation,
        token_ttl: Duration::from_secs(config.policy.token_ttl_secs),
        global_max: config.concurrency.global_max,
        per_capability_max: config.concurrency.per_capability_max,
    }
}

/// Credentials from `[credentials.<name>]`, reading each secret from the
/// process environment.
///
/// # Errors
///
/// Returns an error if a credential's host entries are malformed.
pub fn credential_store(config: &Config) -> BrokerResult<CredentialStore> {
    credential_store_with(config, |var| std::env::var(var).ok())
}

/// [`credential_store`] with an explicit variable lookup.
///
/// A credential whose variable is unset or empty is skipped with a warning:
/// requests that need it run without it and are refused upstream.
///
/// # Errors
///
/// Returns an error if a credential's host entries are malformed.
pub fn credential_store_with(
    config: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> BrokerResult<CredentialStore> {
    let mut store = CredentialStore::new();
    for (name, section) in &config.credentials {
        let Some(secret) = lookup(&section.env).filter(|s| !s.is_empty()) else {
            warn!(credential = %name, env = %section.env, "credential variable is not set; skipping");
            continue;
        };
        store.insert(Credential::new(
            name.clone(),
            secret,
            &section.hosts,
            section.header.clone(),
            section.scheme.clone(),
        )?);
    }
    Ok(store)
}

/// The audit log described by `[audit]`.
///
/// An empty `path` keeps records in memory; an empty `key_path` signs with
/// a key that lives only as long as the process.
///
/// # Errors
///
/// Returns an error if the log file or the key cannot be opened.
pub fn audit_log(config: &Config) -> BrokerResult<AuditLog> {
    let section = &config.audit;
    let key = if section.key_path.is_empty() {
        KeyPair::generate()
    } else {
        KeyPair::load_or_generate(&section.key_path)?
    };
    let sink: Arc<dyn AuditSink> = if section.path.is_empty() {
        Arc::new(MemorySink::new())
    } else {
        info!(path = %section.path, "writing audit records to file");
        Arc::new(JsonlSink::open(&section.path)?)
    };
    Ok(AuditLog::new(key, sink))
}

impl ToolBroker {
    /// A builder populated from the resolved configuration. Add an approver,
    /// an alarm or tool hosts before building.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit log or a credential cannot be set up.
    pub fn from_config(config: &Config, default_root: &Path) -> BrokerResult<ToolBrokerBuilder> {
        Ok(Self::builder(Arc::new(audit_log(config)?))
            .config(broker_config(config))
            .sandbox(sandbox_config(config))
            .boundary(boundary(config, default_root))
            .credentials(credential_store(config)?))
    }
}
