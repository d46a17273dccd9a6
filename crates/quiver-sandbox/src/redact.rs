//! Redaction of sensitive substrings before output leaves the sandbox.

use std::sync::{Arc, LazyLock};

use quiver_package::SafetyPolicy;
use regex::Regex;

/// Replacement for every redacted substring.
pub const REDACTED: &str = "[REDACTED]";

/// Rewrites text so classified secrets never reach the caller.
pub trait Redactor: Send + Sync {
    /// Return `text` with sensitive substrings replaced by [`REDACTED`].
    fn redact(&self, text: &str) -> String;
}

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRedactor;

impl Redactor for NoopRedactor {
    fn redact(&self, text: &str) -> String {
        text.to_owned()
    }
}

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Authorization headers
        r"(?i)\bbearer\s+[a-z0-9._~+/=-]{8,}",
        // Provider key formats
        r"\bsk-[A-Za-z0-9_-]{16,}",
        r"\bgh[pousr]_[A-Za-z0-9]{20,}",
        r"\bxox[abprs]-[A-Za-z0-9-]{10,}",
        r"\bAKIA[0-9A-Z]{16}\b",
        // PEM private keys
        r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid regex"))
    .collect()
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(api[_-]?key|access[_-]?token|secret|password|passwd)(["']?\s*[:=]\s*["']?)([^\s"',}]+)"#)
        .expect("invalid regex")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("invalid regex")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b").expect("invalid regex")
});

/// Pattern-based classifier for credential-shaped and personal data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternRedactor {
    secrets: bool,
    pii: bool,
}

impl Default for PatternRedactor {
    fn default() -> Self {
        Self {
            secrets: true,
            pii: false,
        }
    }
}

impl PatternRedactor {
    /// Create a redactor with the given classes enabled.
    #[must_use]
    pub fn new(secrets: bool, pii: bool) -> Self {
        Self { secrets, pii }
    }

    /// Redactor matching a package's safety policy.
    #[must_use]
    pub fn for_policy(policy: &SafetyPolicy) -> Self {
        Self::new(policy.redact_secrets, policy.redact_pii)
    }
}

impl Redactor for PatternRedactor {
    fn redact(&self, text: &str) -> String {
        let mut out = text.to_owned();
        if self.secrets {
            for re in SECRET_PATTERNS.iter() {
                if re.is_match(&out) {
                    out = re.replace_all(&out, REDACTED).into_owned();
                }
            }
            if ASSIGNMENT.is_match(&out) {
                out = ASSIGNMENT
                    .replace_all(&out, format!("${{1}}${{2}}{REDACTED}"))
                    .into_owned();
            }
        }
        if self.pii {
            for re in [&*EMAIL, &*PHONE] {
                if re.is_match(&out) {
                    out = re.replace_all(&out, REDACTED).into_owned();
                }
            }
        }
        out
    }
}

/// Applies several redactors in order.
#[derive(Clone, Default)]
pub struct RedactorChain {
    redactors: Vec<Arc<dyn Redactor>>,
}

impl std::fmt::Debug for RedactorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactorChain")
            .field("redactors", &self.redactors.len())
            .finish()
    }
}

impl RedactorChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a redactor.
    #[must_use]
    pub fn with(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactors.push(redactor);
        self
    }
}

impl Redactor for RedactorChain {
    fn redact(&self, text: &str) -> String {
        self.redactors
            .iter()
            .fold(text.to_owned(), |acc, r| r.redact(&acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_shapes_redacted() {
        let r = PatternRedactor::default();
        assert_eq!(
            r.redact("Authorization: Bearer abcdefgh12345678"),
            "Authorization: [REDACTED]"
        );
        assert_eq!(
            r.redact("key sk-abcdefghijklmnopqrstu used"),
            "key [REDACTED] used"
        );
        assert_eq!(r.redact("password=hunter2 ok"), "password=[REDACTED] ok");
        assert_eq!(r.redact(r#"{"api_key": "abc123"}"#), r#"{"api_key": "[REDACTED]"}"#);
        assert_eq!(r.redact("nothing to see"), "nothing to see");
    }

    #[test]
    fn test_pii_only_when_enabled() {
        let text = "contact jane@example.com or 555-123-4567";
        assert_eq!(PatternRedactor::default().redact(text), text);
        assert_eq!(
            PatternRedactor::new(false, true).redact(text),
            "contact [REDACTED] or [REDACTED]"
        );
    }

    #[test]
    fn test_disabled_is_passthrough() {
        let r = PatternRedactor::new(false, false);
        assert_eq!(r.redact("Bearer abcdefgh12345678"), "Bearer abcdefgh12345678");
    }

    #[test]
    fn test_chain_applies_in_order() {
        struct Literal(&'static str);
        impl Redactor for Literal {
            fn redact(&self, text: &str) -> String {
                text.replace(self.0, REDACTED)
            }
        }
        let chain = RedactorChain::new()
            .with(Arc::new(Literal("swordfish")))
            .with(Arc::new(PatternRedactor::default()));
        assert_eq!(
            chain.redact("token swordfish and Bearer abcdefgh12345678"),
            "token [REDACTED] and [REDACTED]"
        );
    }
}
