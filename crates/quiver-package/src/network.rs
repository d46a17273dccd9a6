//! Network allow-entries.
//!
//! An entry is one of `host`, `*.suffix` or `host:port`. Entries never carry
//! a scheme, path or userinfo; matching happens against the host the `url`
//! crate extracts from a request URL.

use std::fmt;

/// A parsed network allow-entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkEntry {
    /// Exact host, any port.
    Host(String),
    /// Any subdomain of the suffix (not the suffix itself).
    Wildcard(String),
    /// Exact host and port.
    HostPort(String, u16),
}

impl NetworkEntry {
    /// Parse an allow-entry.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the entry is malformed.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let entry = raw.trim().to_ascii_lowercase();
        if entry.is_empty() {
            return Err("network entry is empty".to_owned());
        }
        if entry.contains("://") || entry.contains('/') || entry.contains('@') {
            return Err(format!(
                "network entry `{raw}` must be a bare host, `*.suffix` or `host:port`"
            ));
        }

        if let Some(suffix) = entry.strip_prefix("*.") {
            validate_host(suffix).map_err(|e| format!("network entry `{raw}`: {e}"))?;
            if !suffix.contains('.') {
                return Err(format!(
                    "network entry `{raw}` wildcards a top-level domain"
                ));
            }
            return Ok(Self::Wildcard(suffix.to_owned()));
        }

        if let Some((host, port)) = entry.rsplit_once(':') {
            validate_host(host).map_err(|e| format!("network entry `{raw}`: {e}"))?;
            let port: u16 = port
                .parse()
                .map_err(|_| format!("network entry `{raw}` has an invalid port"))?;
            if port == 0 {
                return Err(format!("network entry `{raw}` has port 0"));
            }
            return Ok(Self::HostPort(host.to_owned(), port));
        }

        validate_host(&entry).map_err(|e| format!("network entry `{raw}`: {e}"))?;
        Ok(Self::Host(entry))
    }

    /// Whether a connection to `host:port` is covered by this entry.
    #[must_use]
    pub fn matches(&self, host: &str, port: u16) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        match self {
            Self::Host(h) => *h == host,
            Self::Wildcard(suffix) => host
                .strip_suffix(suffix.as_str())
                .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
            Self::HostPort(h, p) => *h == host && *p == port,
        }
    }

    /// Whether every connection this entry allows is also allowed by `other`.
    #[must_use]
    pub fn is_covered_by(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Host(a), Self::Host(b)) => a == b,
            (Self::HostPort(a, _), Self::Host(b)) => a == b,
            (Self::HostPort(a, pa), Self::HostPort(b, pb)) => a == b && pa == pb,
            (Self::Host(a) | Self::HostPort(a, _), Self::Wildcard(_)) => other.matches(a, 0),
            (Self::Wildcard(a), Self::Wildcard(b)) => {
                a == b || Self::Wildcard(b.clone()).matches(a, 0)
            },
            _ => false,
        }
    }
}

impl fmt::Display for NetworkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(h) => f.write_str(h),
            Self::Wildcard(s) => write!(f, "*.{s}"),
            Self::HostPort(h, p) => write!(f, "{h}:{p}"),
        }
    }
}

fn validate_host(host: &str) -> Result<(), String> {
    if host.is_empty() || host.len() > 253 {
        return Err("host must be 1-253 characters".to_owned());
    }
    for label in host.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("label `{label}` must be 1-63 characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label `{label}` starts or ends with a hyphen"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(format!("label `{label}` contains invalid characters"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            NetworkEntry::parse("API.example.com").unwrap(),
            NetworkEntry::Host("api.example.com".to_owned())
        );
        assert_eq!(
            NetworkEntry::parse("*.example.com").unwrap(),
            NetworkEntry::Wildcard("example.com".to_owned())
        );
        assert_eq!(
            NetworkEntry::parse("localhost:8080").unwrap(),
            NetworkEntry::HostPort("localhost".to_owned(), 8080)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "https://example.com",
            "example.com/path",
            "user@example.com",
            "*.com",
            "-bad.com",
            "exa mple.com",
            "host:0",
            "host:99999",
            "!example.com",
        ] {
            assert!(NetworkEntry::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_wildcard_matches_subdomains_only() {
        let entry = NetworkEntry::parse("*.example.com").unwrap();
        assert!(entry.matches("api.example.com", 443));
        assert!(entry.matches("a.b.example.com", 443));
        assert!(!entry.matches("example.com", 443));
        assert!(!entry.matches("badexample.com", 443));
    }

    #[test]
    fn test_host_port_matching() {
        let entry = NetworkEntry::parse("localhost:8080").unwrap();
        assert!(entry.matches("localhost", 8080));
        assert!(!entry.matches("localhost", 8081));
    }

    #[test]
    fn test_coverage() {
        let host = NetworkEntry::parse("api.example.com").unwrap();
        let wildcard = NetworkEntry::parse("*.example.com").unwrap();
        let narrower = NetworkEntry::parse("*.eu.example.com").unwrap();
        assert!(host.is_covered_by(&wildcard));
        assert!(!wildcard.is_covered_by(&host));
        assert!(narrower.is_covered_by(&wildcard));
        assert!(!wildcard.is_covered_by(&narrower));
    }
}
