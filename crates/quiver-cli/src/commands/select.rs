//! Select command - decide which capabilities apply to a task.

use std::path::Path;

use quiver_config::Config;
use quiver_package::discover_headers;
use quiver_selection::{ScoredCandidate, SelectionOptions, TaskContext, select};

use crate::theme::Theme;

/// Task description and flags of `quiver select`.
pub(crate) struct SelectArgs {
    pub(crate) task: String,
    pub(crate) files: Vec<String>,
    pub(crate) intents: Vec<String>,
    pub(crate) capability: Option<String>,
    pub(crate) explain: bool,
}

impl SelectArgs {
    fn context(&self) -> TaskContext {
        TaskContext {
            task: self.task.clone(),
            files: self.files.clone(),
            intents: self.intents.clone(),
            capability: self.capability.clone(),
        }
    }
}

/// Score every package under `root` against the task.
///
/// Only package headers are read; bodies and tools stay on disk.
pub(crate) fn run(root: &Path, args: &SelectArgs, config: &Config) -> anyhow::Result<()> {
    let headers = discover_headers(root)?;
    let options = SelectionOptions::with_threshold(config.selection.threshold);
    let selection = select(&args.context(), &headers, &options)?;

    if !args.explain {
        for name in selection.names() {
            println!("{name}");
        }
        return Ok(());
    }

    println!("\n{}", Theme::header("Selected"));
    if selection.selected.is_empty() {
        println!("{}", Theme::info("no capability reached the threshold"));
    }
    for candidate in &selection.selected {
        print_candidate(candidate, options.threshold);
    }
    if !selection.below_threshold.is_empty() {
        println!(
            "\n{}",
            Theme::header(&format!("Below threshold ({})", options.threshold))
        );
        for candidate in &selection.below_threshold {
            print_candidate(candidate, options.threshold);
        }
    }
    println!();
    Ok(())
}

fn print_candidate(candidate: &ScoredCandidate, threshold: u32) {
    let mut line = format!(
        "  {:<24} score {}",
        candidate.name,
        Theme::score(candidate.score, threshold)
    );
    if let Some(priority) = candidate.priority {
        line.push_str(&format!("  priority {priority}"));
    }
    if candidate.explicit {
        line.push_str("  (explicit)");
    }
    println!("{line}");
    println!("    {}", Theme::dimmed(&candidate.breakdown.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_flags() {
        let args = SelectArgs {
            task: "merge these".to_owned(),
            files: vec!["a.pdf".to_owned()],
            intents: vec!["merge".to_owned()],
            capability: Some("pdf-tools".to_owned()),
            explain: false,
        };
        let ctx = args.context();
        assert_eq!(ctx.files, vec!["a.pdf"]);
        assert_eq!(ctx.intents, vec!["merge"]);
        assert_eq!(ctx.capability.as_deref(), Some("pdf-tools"));
    }
}
