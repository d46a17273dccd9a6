//! Tools command - list tools or export them in a host's format.

use std::path::Path;

use anyhow::anyhow;
use colored::Colorize;
use quiver_package::{binding_for, load_package};

use crate::theme::Theme;

/// List the tools of the package in `dir`, or print them as `host` expects.
pub(crate) fn run(dir: &Path, host: Option<&str>) -> anyhow::Result<()> {
    let package = load_package(dir)?;

    if let Some(host) = host {
        let binding = binding_for(host)
            .ok_or_else(|| anyhow!("unknown host `{host}`; expected mcp, openai or anthropic"))?;
        let exported = binding.export(&package);
        println!("{}", serde_json::to_string_pretty(&exported)?);
        return Ok(());
    }

    if package.tools.is_empty() {
        println!("{}", Theme::info("No tools declared"));
        return Ok(());
    }

    println!("\n{}", Theme::header(&format!("Tools in {}", package.name())));
    println!(
        "{:<24} {:<8} {:<12} {}",
        "NAME".dimmed(),
        "RUNTIME".dimmed(),
        "CONFIRM".dimmed(),
        "DESCRIPTION".dimmed()
    );
    println!("{}", Theme::rule());
    for tool in &package.tools {
        println!(
            "{:<24} {:<8} {:<12} {}",
            tool.name,
            tool.implementation.runtime.as_str(),
            Theme::confirmation(tool.confirmation_level()),
            tool.description
        );
    }
    println!();
    Ok(())
}
