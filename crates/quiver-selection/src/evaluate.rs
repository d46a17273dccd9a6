//! Replaying manifest evaluation examples against the engine.

use quiver_package::{EvaluationExample, PackageHeader};
use serde::Serialize;
use tracing::warn;

use crate::context::TaskContext;
use crate::engine::{SelectionOptions, select};

/// How one example fared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleOutcome {
    /// Example task text.
    pub task: String,
    /// Whether the package was expected to be selected.
    pub expected: bool,
    /// Whether it was selected.
    pub selected: bool,
    /// Score the package reached.
    pub score: u32,
    /// Position among the selected capabilities, zero-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

impl ExampleOutcome {
    /// Whether the outcome matches the expectation.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.expected == self.selected
    }
}

/// Outcomes for every example of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    /// Package under evaluation.
    pub package: String,
    /// Per-example outcomes, in declaration order.
    pub outcomes: Vec<ExampleOutcome>,
}

impl EvaluationReport {
    /// Whether every example passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(ExampleOutcome::passed)
    }

    /// Number of failing examples.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }
}

/// Run `examples` for `package` against the full candidate set.
///
/// `package` is added to `candidates` when missing, so an example can be
/// replayed against the package alone by passing an empty slice.
#[must_use]
pub fn evaluate_examples(
    package: &PackageHeader,
    examples: &[EvaluationExample],
    candidates: &[PackageHeader],
    options: &SelectionOptions,
) -> EvaluationReport {
    let mut pool = candidates.to_vec();
    if !pool.iter().any(|h| h.name == package.name) {
        pool.push(package.clone());
    }

    let outcomes = examples
        .iter()
        .map(|example| {
            let ctx = TaskContext {
                task: example.task.clone(),
                files: example.files.clone(),
                intents: example.intents.clone(),
                capability: None,
            };
            let (selected, score, rank) = match select(&ctx, &pool, options) {
                Ok(selection) => {
                    let rank = selection.selected.iter().position(|c| c.name == package.name);
                    let score = selection
                        .selected
                        .iter()
                        .chain(&selection.below_threshold)
                        .find(|c| c.name == package.name)
                        .map_or(0, |c| c.score);
                    (rank.is_some(), score, rank)
                },
                Err(_) => (false, 0, None),
            };
            let outcome = ExampleOutcome {
                task: example.task.clone(),
                expected: example.expect_selected,
                selected,
                score,
                rank,
            };
            if !outcome.passed() {
                warn!(
                    package = %package.name,
                    task = %example.task,
                    expected = outcome.expected,
                    score,
                    "evaluation example failed"
                );
            }
            outcome
        })
        .collect();

    EvaluationReport {
        package: package.name.clone(),
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_package::SelectionTrigger;

    fn header() -> PackageHeader {
        PackageHeader {
            name: "pdf-tools".to_owned(),
            description: "PDF utilities".to_owned(),
            version: "1".to_owned(),
            tags: Vec::new(),
            triggers: SelectionTrigger {
                keywords: vec!["pdf".to_owned()],
                file_types: vec!["pdf".to_owned()],
                intents: Vec::new(),
                priority: None,
            },
            root: None,
        }
    }

    fn example(task: &str, files: &[&str], expect_selected: bool) -> EvaluationExample {
        EvaluationExample {
            task: task.to_owned(),
            files: files.iter().map(|f| (*f).to_owned()).collect(),
            intents: Vec::new(),
            expect_selected,
        }
    }

    #[test]
    fn test_examples_replayed() {
        let examples = vec![
            example("merge these", &["a.pdf"], true),
            example("rename some photos", &[], false),
            example("pdf please", &[], true),
        ];
        let report = evaluate_examples(&header(), &examples, &[], &SelectionOptions::default());
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].passed());
        assert_eq!(report.outcomes[0].rank, Some(0));
        assert!(report.outcomes[1].passed());
        assert!(!report.outcomes[2].passed());
        assert_eq!(report.outcomes[2].score, 2);
        assert_eq!(report.failures(), 1);
        assert!(!report.all_passed());
    }
}
