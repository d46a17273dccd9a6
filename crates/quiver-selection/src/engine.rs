//! Selection.
//!
//! # Algorithm
//!
//! 1. An explicitly named capability is selected alone, without scoring
//!    against the threshold.
//! 2. Every other candidate is scored (see [`crate::score`]).
//! 3. Candidates at or above the threshold are kept.
//! 4. Order: score descending, then priority descending (undeclared lowest),
//!    then name ascending.
//!
//! The result depends only on the inputs.

use std::cmp::Ordering;

use quiver_package::PackageHeader;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::error::{SelectionError, SelectionResult};
use crate::score::{ScoreBreakdown, score};

/// Default minimum score.
pub const DEFAULT_THRESHOLD: u32 = 3;

/// Tunables for [`select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Minimum score a candidate needs.
    pub threshold: u32,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl SelectionOptions {
    /// Options with a custom threshold.
    #[must_use]
    pub fn with_threshold(threshold: u32) -> Self {
        Self { threshold }
    }
}

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    /// Package name.
    pub name: String,
    /// Total score.
    pub score: u32,
    /// Declared priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Matched triggers.
    pub breakdown: ScoreBreakdown,
    /// Whether the caller named this capability.
    pub explicit: bool,
}

impl ScoredCandidate {
    fn rank(a: &Self, b: &Self) -> Ordering {
        b.score
            .cmp(&a.score)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// Ordered selection plus the candidates that fell below the threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Selected candidates, best first.
    pub selected: Vec<ScoredCandidate>,
    /// Scored candidates under the threshold, in the same order.
    pub below_threshold: Vec<ScoredCandidate>,
}

impl Selection {
    /// Names of the selected capabilities, best first.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.selected.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether `name` was selected.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.selected.iter().any(|c| c.name == name)
    }
}

fn scored(header: &PackageHeader, ctx: &TaskContext, explicit: bool) -> ScoredCandidate {
    let breakdown = score(&header.triggers, ctx);
    ScoredCandidate {
        name: header.name.clone(),
        score: breakdown.total(),
        priority: header.triggers.priority,
        breakdown,
        explicit,
    }
}

/// Decide which candidates apply to `ctx`.
///
/// # Errors
///
/// Returns [`SelectionError::UnknownCapability`] when `ctx.capability` names
/// a package that is not among `candidates`.
pub fn select(
    ctx: &TaskContext,
    candidates: &[PackageHeader],
    options: &SelectionOptions,
) -> SelectionResult<Selection> {
    if let Some(name) = &ctx.capability {
        let header = candidates
            .iter()
            .find(|h| h.name == *name)
            .ok_or_else(|| SelectionError::UnknownCapability(name.clone()))?;
        info!(capability = %name, "capability selected explicitly");
        return Ok(Selection {
            selected: vec![scored(header, ctx, true)],
            below_threshold: Vec::new(),
        });
    }

    let mut all: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|h| scored(h, ctx, false))
        .inspect(|c| debug!(capability = %c.name, score = c.score, breakdown = %c.breakdown, "scored"))
        .collect();
    all.sort_by(ScoredCandidate::rank);

    let (selected, below_threshold): (Vec<_>, Vec<_>) =
        all.into_iter().partition(|c| c.score >= options.threshold);
    info!(
        candidates = candidates.len(),
        selected = selected.len(),
        threshold = options.threshold,
        "selection complete"
    );
    Ok(Selection {
        selected,
        below_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_package::SelectionTrigger;

    fn header(name: &str, keywords: &[&str], priority: Option<i64>) -> PackageHeader {
        PackageHeader {
            name: name.to_owned(),
            description: format!("{name} package"),
            version: "1".to_owned(),
            tags: Vec::new(),
            triggers: SelectionTrigger {
                keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
                file_types: Vec::new(),
                intents: Vec::new(),
                priority,
            },
            root: None,
        }
    }

    #[test]
    fn test_threshold_filters() {
        let candidates = vec![
            header("pdf-tools", &["pdf"], None),
            header("csv-tools", &["csv"], None),
        ];
        let ctx = TaskContext::new("split this pdf").with_intent("x");
        let selection = select(&ctx, &candidates, &SelectionOptions::default()).unwrap();
        assert!(selection.selected.is_empty());
        assert_eq!(selection.below_threshold[0].name, "pdf-tools");

        let selection = select(&ctx, &candidates, &SelectionOptions::with_threshold(2)).unwrap();
        assert_eq!(selection.names(), vec!["pdf-tools"]);
    }

    #[test]
    fn test_tie_break_by_priority_then_name() {
        let candidates = vec![
            header("zeta", &["report", "pdf"], None),
            header("beta", &["report", "pdf"], Some(1)),
            header("alpha", &["report", "pdf"], None),
            header("gamma", &["report", "pdf"], Some(5)),
        ];
        let ctx = TaskContext::new("pdf report");
        let selection = select(&ctx, &candidates, &SelectionOptions::default()).unwrap();
        assert_eq!(selection.names(), vec!["gamma", "beta", "alpha", "zeta"]);
    }

    #[test]
    fn test_negative_priority_beats_undeclared() {
        let candidates = vec![
            header("alpha", &["pdf", "merge"], None),
            header("beta", &["pdf", "merge"], Some(-3)),
        ];
        let ctx = TaskContext::new("merge pdf");
        let selection = select(&ctx, &candidates, &SelectionOptions::default()).unwrap();
        assert_eq!(selection.names(), vec!["beta", "alpha"]);
    }

    #[test]
    fn test_explicit_bypasses_scoring() {
        let candidates = vec![header("pdf-tools", &["pdf"], None), header("other", &[], None)];
        let ctx = TaskContext::new("nothing relevant").with_capability("other");
        let selection = select(&ctx, &candidates, &SelectionOptions::default()).unwrap();
        assert_eq!(selection.names(), vec!["other"]);
        assert!(selection.selected[0].explicit);
        assert_eq!(selection.selected[0].score, 0);
    }

    #[test]
    fn test_unknown_capability() {
        let ctx = TaskContext::new("x").with_capability("missing");
        assert_eq!(
            select(&ctx, &[], &SelectionOptions::default()),
            Err(SelectionError::UnknownCapability("missing".to_owned()))
        );
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let mut candidates = vec![
            header("b", &["x", "y"], Some(2)),
            header("a", &["x", "y"], Some(2)),
            header("c", &["x", "y", "z"], None),
        ];
        let ctx = TaskContext::new("x y z");
        let first = select(&ctx, &candidates, &SelectionOptions::default()).unwrap();
        candidates.reverse();
        let second = select(&ctx, &candidates, &SelectionOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.names(), vec!["c", "a", "b"]);
    }
}
