//! Broker settings.

use std::time::Duration;

/// Host policy and ceilings applied by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Capability packages that may never run.
    pub blocked_capabilities: Vec<String>,
    /// Tools that may never run: `tool` blocks it in every package,
    /// `capability/tool` in one.
    pub blocked_tools: Vec<String>,
    /// How long to wait for an approver.
    pub confirmation_timeout: Duration,
    /// Treat `recommended` tool confirmation as `required`.
    pub strict_confirmation: bool,
    /// Lifetime of capability tokens.
    pub token_ttl: Duration,
    /// Executions running at once, across all capabilities.
    pub global_max: usize,
    /// Executions running at once per capability.
    pub per_capability_max: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            blocked_capabilities: Vec::new(),
            blocked_tools: Vec::new(),
            confirmation_timeout: Duration::from_secs(300),
            strict_confirmation: false,
            token_ttl: Duration::from_secs(60),
            global_max: 16,
            per_capability_max: 4,
        }
    }
}

impl BrokerConfig {
    /// Why `capability/tool` is blocked by host policy, if it is.
    #[must_use]
    pub fn blocked(&self, capability: &str, tool: &str) -> Option<String> {
        if self.blocked_capabilities.iter().any(|c| c == capability) {
            return Some(format!("capability `{capability}` is blocked by host policy"));
        }
        let qualified = format!("{capability}/{tool}");
        self.blocked_tools
            .iter()
            .any(|t| *t == tool || *t == qualified)
            .then(|| format!("tool `{qualified}` is blocked by host policy"))
    }

    /// Set the confirmation timeout.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set both concurrency ceilings.
    #[must_use]
    pub fn with_concurrency(mut self, global_max: usize, per_capability_max: usize) -> Self {
        self.global_max = global_max;
        self.per_capability_max = per_capability_max;
        self
    }

    /// Block tools (`tool` or `capability/tool`).
    #[must_use]
    pub fn with_blocked_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Block capability packages.
    #[must_use]
    pub fn with_blocked_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }
}
