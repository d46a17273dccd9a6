//! Lexical path normalisation.
//!
//! Paths are never resolved through the filesystem here: the policy engine
//! judges the path the sandbox asked for, and the broker re-checks the real
//! location before touching it.

use std::path::{Component, Path};

/// Normalise `requested` to a root-relative, `/`-separated path.
///
/// Backslashes are treated as separators. Relative paths resolve against
/// `root`; absolute paths must lie under it. `.` and `..` are resolved
/// lexically. Returns `None` when the path escapes the root.
#[must_use]
pub fn normalize(root: &Path, requested: &str) -> Option<String> {
    let requested = requested.replace('\\', "/");
    if requested.is_empty() || requested.contains('\0') {
        return None;
    }

    if requested.starts_with('/') {
        let root_parts = lexical_parts(root.to_str()?)?;
        let absolute = lexical_parts(&requested)?;
        let rest = absolute.strip_prefix(root_parts.as_slice())?;
        return Some(rest.join("/"));
    }
    if looks_like_drive(&requested) {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in requested.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                parts.pop()?;
            },
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Components of an absolute path after lexical `.`/`..` resolution.
fn lexical_parts(path: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::RootDir | Component::CurDir => {},
            Component::ParentDir => {
                parts.pop();
            },
            Component::Normal(s) => parts.push(s.to_str()?),
            Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}

fn looks_like_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
