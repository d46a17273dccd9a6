//! Broker-side credential store.
//!
//! Secrets live here and nowhere else. They are attached to outbound
//! requests for the hosts they are bound to, only for packages that list the
//! credential under `secrets`, and are scrubbed from anything flowing back
//! to the sandbox or the caller.

use quiver_package::NetworkEntry;
use quiver_sandbox::{REDACTED, Redactor};
use zeroize::Zeroizing;

use crate::error::{BrokerError, BrokerResult};

/// One named secret and where it may be sent.
pub struct Credential {
    name: String,
    secret: Zeroizing<String>,
    hosts: Vec<NetworkEntry>,
    header: String,
    scheme: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("hosts", &self.hosts)
            .field("header", &self.header)
            .field("secret", &REDACTED)
            .finish()
    }
}

impl Credential {
    /// Create a credential sent as `header: scheme secret` to `hosts`.
    ///
    /// An empty `scheme` sends the bare secret.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Credential`] if the secret is empty or a host
    /// entry does not parse.
    pub fn new(
        name: impl Into<String>,
        secret: impl Into<String>,
        hosts: &[String],
        header: impl Into<String>,
        scheme: impl Into<String>,
    ) -> BrokerResult<Self> {
        let name = name.into();
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(BrokerError::Credential {
                name,
                message: "secret is empty".to_owned(),
            });
        }
        let hosts = hosts
            .iter()
            .map(|h| NetworkEntry::parse(h))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| BrokerError::Credential {
                name: name.clone(),
                message,
            })?;
        Ok(Self {
            name,
            secret,
            hosts,
            header: header.into(),
            scheme: scheme.into(),
        })
    }

    /// Credential name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host entries the credential is bound to.
    #[must_use]
    pub fn hosts(&self) -> &[NetworkEntry] {
        &self.hosts
    }

    /// Whether the credential is sent to `host:port`.
    #[must_use]
    pub fn applies_to(&self, host: &str, port: u16) -> bool {
        self.hosts.iter().any(|e| e.matches(host, port))
    }

    fn header_value(&self) -> Zeroizing<String> {
        if self.scheme.is_empty() {
            self.secret.clone()
        } else {
            Zeroizing::new(format!("{} {}", self.scheme, self.secret.as_str()))
        }
    }
}

/// The set of credentials the broker may attach.
#[derive(Debug, Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential, replacing one with the same name.
    pub fn insert(&mut self, credential: Credential) {
        self.credentials.retain(|c| c.name != credential.name);
        self.credentials.push(credential);
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, credential: Credential) -> Self {
        self.insert(credential);
        self
    }

    /// Number of credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Credential names, never values.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.credentials.iter().map(Credential::name).collect()
    }

    /// Credentials a package that declared `allowed` may use.
    pub fn usable<'a>(&'a self, allowed: &'a [String]) -> impl Iterator<Item = &'a Credential> {
        self.credentials
            .iter()
            .filter(move |c| allowed.iter().any(|a| a == &c.name))
    }

    /// Headers to attach to a request for `host:port` on behalf of a
    /// package that declared `allowed`.
    #[must_use]
    pub fn headers_for(&self, allowed: &[String], host: &str, port: u16) -> Vec<(String, Zeroizing<String>)> {
        self.usable(allowed)
            .filter(|c| c.applies_to(host, port))
            .map(|c| (c.header.clone(), c.header_value()))
            .collect()
    }
}

impl Redactor for CredentialStore {
    fn redact(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for credential in &self.credentials {
            if out.contains(credential.secret.as_str()) {
                out = out.replace(credential.secret.as_str(), REDACTED);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new().with(
            Credential::new(
                "search",
                "s3cr3t-value",
                &["api.search.example".to_owned()],
                "authorization",
                "Bearer",
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let rendered = format!("{:?}", store());
        assert!(rendered.contains("search"));
        assert!(!rendered.contains("s3cr3t-value"));
    }

    #[test]
    fn test_headers_only_for_bound_hosts_and_declared_packages() {
        let store = store();
        let declared = vec!["search".to_owned()];

        let headers = store.headers_for(&declared, "api.search.example", 443);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "authorization");
        assert_eq!(headers[0].1.as_str(), "Bearer s3cr3t-value");

        assert!(store.headers_for(&declared, "evil.example", 443).is_empty());
        assert!(store.headers_for(&[], "api.search.example", 443).is_empty());
    }

    #[test]
    fn test_redacts_values() {
        let text = "echo: token=s3cr3t-value and again s3cr3t-value";
        assert_eq!(
            store().redact(text),
            "echo: token=[REDACTED] and again [REDACTED]"
        );
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(Credential::new("x", "", &[], "authorization", "Bearer").is_err());
        assert!(Credential::new("x", "v", &["http://a b".to_owned()], "h", "").is_err());
    }

    #[test]
    fn test_insert_replaces() {
        let mut store = store();
        store.insert(Credential::new("search", "other-value", &[], "x-api-key", "").unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.names(), vec!["search"]);
    }
}
