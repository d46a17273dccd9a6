//! Permission evaluation.
//!
//! # Evaluation order
//!
//! 1. Normalise the target (path against the execution root, URL host/port)
//!    → `EscapesRoot` / `InvalidUrl` / `UnsupportedScheme`
//! 2. Nothing declared in the category → `NotDeclared`
//! 3. Package grant and boundary statically disjoint → `EmptyIntersection`
//! 4. No declared entry matches → `NotDeclared`
//! 5. A boundary is set and none of its entries match → `OutsideBoundary`
//! 6. Otherwise → `Grant`

use std::fmt;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use quiver_package::{NetworkEntry, PermissionSet};
use serde::Serialize;
use tracing::debug;

use crate::action::{Decision, DenyReason, RequestedAction};
use crate::boundary::ExternalBoundary;
use crate::path::normalize;

/// Evaluate `action` against the intersection of `perms` and `boundary`.
#[must_use]
pub fn evaluate(
    perms: &PermissionSet,
    boundary: &ExternalBoundary,
    action: &RequestedAction,
) -> Decision {
    let decision = match action {
        RequestedAction::ReadFile { path } => evaluate_path(
            "fs_read",
            &perms.fs_read,
            boundary.fs_read.as_deref(),
            &boundary.root,
            path,
        ),
        RequestedAction::WriteFile { path, .. } => evaluate_path(
            "fs_write",
            &perms.fs_write,
            boundary.fs_write.as_deref(),
            &boundary.root,
            path,
        ),
        RequestedAction::Connect { url } => {
            evaluate_connect(&perms.network, boundary.network.as_deref(), url)
        },
        RequestedAction::SpawnProcess { program } => {
            evaluate_spawn(perms.process_spawn, boundary.process_spawn, program)
        },
    };
    debug!(action = %action.describe(), ?decision, "policy evaluated");
    decision
}

fn compile(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if pattern.starts_with('!') {
            return Err(pattern.clone());
        }
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|_| pattern.clone())?;
        builder.add(glob);
    }
    builder.build().map_err(|e| e.to_string())
}

fn evaluate_path(
    category: &str,
    declared: &[String],
    bounded: Option<&[String]>,
    root: &Path,
    requested: &str,
) -> Decision {
    let Some(path) = normalize(root, requested) else {
        return Decision::deny(DenyReason::EscapesRoot {
            path: requested.to_owned(),
        });
    };
    if declared.is_empty() {
        return Decision::deny(DenyReason::NotDeclared { target: path });
    }
    if let Some(bounded) = bounded
        && globs_disjoint(declared, bounded)
    {
        return Decision::deny(DenyReason::EmptyIntersection {
            category: category.to_owned(),
        });
    }

    let declared_set = match compile(declared) {
        Ok(set) => set,
        Err(pattern) => return Decision::deny(DenyReason::InvalidPattern { pattern }),
    };
    if !declared_set.is_match(&path) {
        return Decision::deny(DenyReason::NotDeclared { target: path });
    }
    if let Some(bounded) = bounded {
        match compile(bounded) {
            Ok(set) if set.is_match(&path) => {},
            Ok(_) => return Decision::deny(DenyReason::OutsideBoundary { target: path }),
            Err(pattern) => return Decision::deny(DenyReason::InvalidPattern { pattern }),
        }
    }
    Decision::Grant
}

fn parse_entries(raw: &[String]) -> Result<Vec<NetworkEntry>, String> {
    raw.iter()
        .map(|e| NetworkEntry::parse(e).map_err(|_| e.clone()))
        .collect()
}

fn evaluate_connect(declared: &[String], bounded: Option<&[String]>, raw_url: &str) -> Decision {
    let url = match url::Url::parse(raw_url) {
        Ok(url) => url,
        Err(e) => {
            return Decision::deny(DenyReason::InvalidUrl {
                detail: e.to_string(),
            });
        },
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Decision::deny(DenyReason::UnsupportedScheme {
            scheme: url.scheme().to_owned(),
        });
    }
    let Some(host) = url.host_str() else {
        return Decision::deny(DenyReason::InvalidUrl {
            detail: "URL has no host".to_owned(),
        });
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port_or_known_default().unwrap_or(0);
    let target = format!("{host}:{port}");

    if declared.is_empty() {
        return Decision::deny(DenyReason::NotDeclared { target });
    }
    let declared = match parse_entries(declared) {
        Ok(entries) => entries,
        Err(pattern) => return Decision::deny(DenyReason::InvalidPattern { pattern }),
    };
    let bounded = match bounded.map(parse_entries).transpose() {
        Ok(entries) => entries,
        Err(pattern) => return Decision::deny(DenyReason::InvalidPattern { pattern }),
    };
    if let Some(bounded) = &bounded
        && network_overlap(&declared, bounded).is_empty()
    {
        return Decision::deny(DenyReason::EmptyIntersection {
            category: "network".to_owned(),
        });
    }

    if !declared.iter().any(|e| e.matches(host, port)) {
        return Decision::deny(DenyReason::NotDeclared { target });
    }
    if let Some(bounded) = &bounded
        && !bounded.iter().any(|e| e.matches(host, port))
    {
        return Decision::deny(DenyReason::OutsideBoundary { target });
    }
    Decision::Grant
}

fn evaluate_spawn(declared: bool, bounded: Option<bool>, program: &str) -> Decision {
    if !declared {
        return Decision::deny(DenyReason::NotDeclared {
            target: program.to_owned(),
        });
    }
    if bounded == Some(false) {
        return Decision::deny(DenyReason::EmptyIntersection {
            category: "process_spawn".to_owned(),
        });
    }
    Decision::Grant
}

/// Network entries allowed by both sides: each entry that is covered by an
/// entry on the other side, i.e. the narrower of every overlapping pair.
fn network_overlap(declared: &[NetworkEntry], bounded: &[NetworkEntry]) -> Vec<NetworkEntry> {
    let mut out: Vec<NetworkEntry> = Vec::new();
    let narrower = declared
        .iter()
        .filter(|d| bounded.iter().any(|b| d.is_covered_by(b)))
        .chain(
            bounded
                .iter()
                .filter(|b| declared.iter().any(|d| b.is_covered_by(d))),
        );
    for entry in narrower {
        if !out.contains(entry) {
            out.push(entry.clone());
        }
    }
    out
}

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Leading path segments that contain no glob syntax.
fn literal_prefix(pattern: &str) -> Vec<&str> {
    pattern
        .split('/')
        .take_while(|seg| !seg.contains(GLOB_META))
        .collect()
}

/// Literal file extension of the final segment, if any.
fn literal_extension(pattern: &str) -> Option<&str> {
    let last = pattern.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty() && !ext.contains(GLOB_META)).then_some(ext)
}

/// Conservative check: `true` only when two globs provably share no path.
fn glob_pair_disjoint(a: &str, b: &str) -> bool {
    let prefix_conflict = literal_prefix(a)
        .iter()
        .zip(literal_prefix(b).iter())
        .any(|(x, y)| x != y);
    let ext_conflict = matches!(
        (literal_extension(a), literal_extension(b)),
        (Some(x), Some(y)) if !x.eq_ignore_ascii_case(y)
    );
    prefix_conflict || ext_conflict
}

fn globs_disjoint(declared: &[String], bounded: &[String]) -> bool {
    declared
        .iter()
        .all(|d| bounded.iter().all(|b| glob_pair_disjoint(d, b)))
}

/// One permission category after intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGrant {
    /// Entries the package declared.
    pub declared: Vec<String>,
    /// Entries the boundary allows; `None` when unrestricted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary: Option<Vec<String>>,
    /// Whether nothing can be granted in this category.
    pub empty: bool,
}

impl CategoryGrant {
    fn render(&self, f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
        write!(f, "{name}=[{}]", self.declared.join(","))?;
        if let Some(boundary) = &self.boundary {
            write!(f, "&[{}]", boundary.join(","))?;
        }
        if self.empty {
            f.write_str("(empty)")?;
        }
        Ok(())
    }
}

/// The effective permission of a package under a boundary, for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveSummary {
    /// Readable paths.
    pub fs_read: CategoryGrant,
    /// Writable paths.
    pub fs_write: CategoryGrant,
    /// Network destinations; `boundary` holds the overlap when restricted.
    pub network: CategoryGrant,
    /// Whether processes may be spawned.
    pub process_spawn: bool,
    /// Categories the package declared but the boundary emptied.
    pub emptied: Vec<String>,
}

impl fmt::Display for EffectiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fs_read.render(f, "fs_read")?;
        f.write_str(" ")?;
        self.fs_write.render(f, "fs_write")?;
        f.write_str(" ")?;
        self.network.render(f, "network")?;
        write!(f, " process_spawn={}", self.process_spawn)
    }
}

/// Render the effective grant and flag statically empty intersections.
#[must_use]
pub fn effective_summary(perms: &PermissionSet, boundary: &ExternalBoundary) -> EffectiveSummary {
    let mut emptied = Vec::new();

    let mut glob_grant = |name: &str, declared: &[String], bounded: Option<&Vec<String>>| {
        let empty = declared.is_empty()
            || bounded.is_some_and(|b| globs_disjoint(declared, b));
        if empty && !declared.is_empty() {
            emptied.push(name.to_owned());
        }
        CategoryGrant {
            declared: declared.to_vec(),
            boundary: bounded.cloned(),
            empty,
        }
    };
    let fs_read = glob_grant("fs_read", &perms.fs_read, boundary.fs_read.as_ref());
    let fs_write = glob_grant("fs_write", &perms.fs_write, boundary.fs_write.as_ref());

    let network = {
        let declared = parse_entries(&perms.network).unwrap_or_default();
        let overlap = boundary.network.as_deref().map(|b| {
            let bounded = parse_entries(b).unwrap_or_default();
            network_overlap(&declared, &bounded)
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        });
        let empty = declared.is_empty() || overlap.as_ref().is_some_and(Vec::is_empty);
        if empty && !perms.network.is_empty() {
            emptied.push("network".to_owned());
        }
        CategoryGrant {
            declared: perms.network.clone(),
            boundary: overlap,
            empty,
        }
    };

    let process_spawn = perms.process_spawn && boundary.process_spawn != Some(false);
    if perms.process_spawn && !process_spawn {
        emptied.push("process_spawn".to_owned());
    }

    EffectiveSummary {
        fs_read,
        fs_write,
        network,
        process_spawn,
        emptied,
    }
}
