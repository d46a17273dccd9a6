//! Validate command - check a package and replay its evaluation examples.

use std::path::Path;

use anyhow::bail;
use colored::Colorize;
use quiver_config::Config;
use quiver_package::{PackageError, load_package};
use quiver_selection::{SelectionOptions, evaluate_examples};

use crate::theme::Theme;

/// Validate the package in `dir`.
pub(crate) fn run(dir: &Path, config: &Config) -> anyhow::Result<()> {
    let package = match load_package(dir) {
        Ok(package) => package,
        Err(PackageError::Manifest { source, .. }) => {
            println!(
                "{}",
                Theme::failure(source.kind.as_str(), &format!("{} is not a valid package", dir.display()))
            );
            println!("  {:<8} {}", "kind".dimmed(), source.kind);
            println!("  {:<8} {}", "field".dimmed(), source.field);
            println!("  {:<8} {}", "message".dimmed(), source.message);
            bail!("validation failed");
        },
        Err(e) => return Err(e.into()),
    };

    println!(
        "{}",
        Theme::success(&format!(
            "{} {} ({} tool{})",
            package.name(),
            package.manifest.version,
            package.tools.len(),
            if package.tools.len() == 1 { "" } else { "s" }
        ))
    );

    let examples = &package.manifest.evaluation.examples;
    if examples.is_empty() {
        return Ok(());
    }
    let options = SelectionOptions::with_threshold(config.selection.threshold);
    let report = evaluate_examples(&package.header(), examples, &[], &options);
    println!("\n{}", Theme::header("Evaluation examples"));
    for outcome in &report.outcomes {
        println!(
            "{} {} {}",
            Theme::verdict(outcome.passed()),
            outcome.task,
            Theme::dimmed(&format!(
                "(expected {}, score {})",
                if outcome.expected { "selected" } else { "not selected" },
                outcome.score
            ))
        );
    }
    if !report.all_passed() {
        bail!("{} evaluation example(s) failed", report.failures());
    }
    Ok(())
}
