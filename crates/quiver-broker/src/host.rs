//! External tool hosts reachable through `tool.invoke`.

use async_trait::async_trait;
use serde_json::Value;

/// A tool system outside the sandbox (an MCP server, a host-native tool
/// registry) the broker can call on a sandbox's behalf.
#[async_trait]
pub trait ExternalToolHost: Send + Sync {
    /// Name sandboxes address the host by.
    fn name(&self) -> &str;

    /// Call `tool` with `arguments`. Errors are plain messages; they reach
    /// the sandbox as `tool_execution` failures.
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value, String>;
}
