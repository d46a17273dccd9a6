//! Host bindings.
//!
//! One capability format maps onto several external tool systems. Each host
//! gets one [`ToolHostBinding`]; nothing outside this module branches on
//! host identity. Per-host overlays from the manifest (`hosts.<name>`)
//! rename and hide tools for that host only.

use serde_json::{Value, json};

use crate::manifest::{CapabilityPackage, HostOverlay, ToolDefinition};

/// Maps package tools onto one host's tool declaration format.
pub trait ToolHostBinding: Send + Sync {
    /// Host name, matching the manifest's `hosts.<name>` key.
    fn host(&self) -> &'static str;

    /// Render one tool under `exported_name` in this host's format.
    fn render(&self, tool: &ToolDefinition, exported_name: &str) -> Value;

    /// Export every tool of `package` visible to this host.
    fn export(&self, package: &CapabilityPackage) -> Vec<Value> {
        let overlay = overlay_for(package, self.host());
        package
            .tools
            .iter()
            .filter(|t| !overlay.disabled_tools.contains(&t.name))
            .map(|t| self.render(t, &exported_name(&overlay, &t.name)))
            .collect()
    }

    /// Map a name the host calls back with to the package's tool.
    fn resolve<'a>(&self, package: &'a CapabilityPackage, exported: &str) -> Option<&'a ToolDefinition> {
        let overlay = overlay_for(package, self.host());
        let name = match &overlay.tool_prefix {
            Some(prefix) => exported.strip_prefix(prefix.as_str())?,
            None => exported,
        };
        if overlay.disabled_tools.iter().any(|d| d == name) {
            return None;
        }
        package.tool(name)
    }
}

fn overlay_for(package: &CapabilityPackage, host: &str) -> HostOverlay {
    package
        .manifest
        .hosts
        .get(host)
        .cloned()
        .unwrap_or_default()
}

fn exported_name(overlay: &HostOverlay, name: &str) -> String {
    match &overlay.tool_prefix {
        Some(prefix) => format!("{prefix}{name}"),
        None => name.to_owned(),
    }
}

/// Model Context Protocol `tools/list` entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct McpBinding;

impl ToolHostBinding for McpBinding {
    fn host(&self) -> &'static str {
        "mcp"
    }

    fn render(&self, tool: &ToolDefinition, exported_name: &str) -> Value {
        let mut value = json!({
            "name": exported_name,
            "description": tool.description,
            "inputSchema": tool.input_schema,
        });
        if let Some(output) = &tool.output_schema {
            value["outputSchema"] = output.clone();
        }
        value
    }
}

/// OpenAI-style function tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiBinding;

impl ToolHostBinding for OpenAiBinding {
    fn host(&self) -> &'static str {
        "openai"
    }

    fn render(&self, tool: &ToolDefinition, exported_name: &str) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": exported_name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        })
    }
}

/// Anthropic Messages API tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicBinding;

impl ToolHostBinding for AnthropicBinding {
    fn host(&self) -> &'static str {
        "anthropic"
    }

    fn render(&self, tool: &ToolDefinition, exported_name: &str) -> Value {
        json!({
            "name": exported_name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        })
    }
}

/// Names of the built-in bindings.
pub const KNOWN_HOSTS: &[&str] = &["mcp", "openai", "anthropic"];

/// Look up a built-in binding by host name.
#[must_use]
pub fn binding_for(host: &str) -> Option<Box<dyn ToolHostBinding>> {
    match host {
        "mcp" => Some(Box::new(McpBinding)),
        "openai" => Some(Box::new(OpenAiBinding)),
        "anthropic" => Some(Box::new(AnthropicBinding)),
        _ => None,
    }
}
