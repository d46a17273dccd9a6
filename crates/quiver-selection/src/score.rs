//! Trigger scoring.

use std::fmt;

use quiver_package::SelectionTrigger;
use regex::RegexBuilder;
use serde::Serialize;

use crate::context::TaskContext;

/// Points for each declared file type the task carries.
pub const FILE_TYPE_WEIGHT: u32 = 3;
/// Points for each declared keyword the task text mentions.
pub const KEYWORD_WEIGHT: u32 = 2;
/// Points for each declared intent the host derived.
pub const INTENT_WEIGHT: u32 = 1;

/// Which triggers matched, for explanation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    /// Matching file types, as declared.
    pub file_types: Vec<String>,
    /// Mentioned keywords, as declared.
    pub keywords: Vec<String>,
    /// Matching intents, as declared.
    pub intents: Vec<String>,
}

fn weighted(count: usize, weight: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).saturating_mul(weight)
}

impl ScoreBreakdown {
    /// Total score.
    #[must_use]
    pub fn total(&self) -> u32 {
        weighted(self.file_types.len(), FILE_TYPE_WEIGHT)
            .saturating_add(weighted(self.keywords.len(), KEYWORD_WEIGHT))
            .saturating_add(weighted(self.intents.len(), INTENT_WEIGHT))
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_types.is_empty() && self.keywords.is_empty() && self.intents.is_empty()
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no trigger matched");
        }
        let parts = self
            .file_types
            .iter()
            .map(|t| format!("file_type {t} (+{FILE_TYPE_WEIGHT})"))
            .chain(
                self.keywords
                    .iter()
                    .map(|k| format!("keyword {k} (+{KEYWORD_WEIGHT})")),
            )
            .chain(
                self.intents
                    .iter()
                    .map(|i| format!("intent {i} (+{INTENT_WEIGHT})")),
            )
            .collect::<Vec<_>>();
        f.write_str(&parts.join(", "))
    }
}

/// Score one package's triggers against a task.
///
/// Each declared trigger counts at most once, however often it matches.
#[must_use]
pub fn score(triggers: &SelectionTrigger, ctx: &TaskContext) -> ScoreBreakdown {
    let extensions = ctx.file_extensions();
    let file_types = distinct(&triggers.file_types, |t| {
        let wanted = t.trim_start_matches('.').to_ascii_lowercase();
        extensions.contains(&wanted)
    });
    let keywords = distinct(&triggers.keywords, |k| mentions(&ctx.task, k));
    let intents = distinct(&triggers.intents, |i| {
        ctx.intents.iter().any(|c| c.trim().eq_ignore_ascii_case(i.trim()))
    });
    ScoreBreakdown {
        file_types,
        keywords,
        intents,
    }
}

/// Declared entries that match, deduplicated case-insensitively.
fn distinct(declared: &[String], mut matches: impl FnMut(&str) -> bool) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for entry in declared {
        let key = entry.trim().to_lowercase();
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        if matches(entry) {
            out.push(entry.clone());
        }
    }
    out
}

/// Case-insensitive whole-word mention of `keyword` in `text`.
fn mentions(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    let word_edge = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut pattern = String::new();
    if word_edge(keyword.chars().next()) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(keyword));
    if word_edge(keyword.chars().next_back()) {
        pattern.push_str(r"\b");
    }
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(text),
        Err(_) => text.to_lowercase().contains(&keyword.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers() -> SelectionTrigger {
        SelectionTrigger {
            keywords: vec!["invoice".to_owned(), "PDF".to_owned(), "c++".to_owned()],
            file_types: vec![".pdf".to_owned(), "docx".to_owned()],
            intents: vec!["summarize".to_owned()],
            priority: None,
        }
    }

    #[test]
    fn test_two_mentions_one_file_type_scores_seven() {
        let ctx = TaskContext::new("Extract the invoice totals from this PDF").with_file("q1.pdf");
        let breakdown = score(&triggers(), &ctx);
        assert_eq!(breakdown.file_types, vec![".pdf"]);
        assert_eq!(breakdown.keywords, vec!["invoice", "PDF"]);
        assert_eq!(breakdown.total(), 7);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let ctx = TaskContext::new("invoices and pdfs");
        assert!(score(&triggers(), &ctx).keywords.is_empty());
        let ctx = TaskContext::new("rewrite in C++ please");
        assert_eq!(score(&triggers(), &ctx).keywords, vec!["c++"]);
    }

    #[test]
    fn test_repeated_mentions_count_once() {
        let ctx = TaskContext::new("invoice invoice INVOICE");
        assert_eq!(score(&triggers(), &ctx).total(), 2);
    }

    #[test]
    fn test_intents() {
        let ctx = TaskContext::new("anything").with_intent("Summarize");
        let breakdown = score(&triggers(), &ctx);
        assert_eq!(breakdown.intents, vec!["summarize"]);
        assert_eq!(breakdown.total(), 1);
    }

    #[test]
    fn test_breakdown_display() {
        let ctx = TaskContext::new("invoice").with_file("a.docx");
        assert_eq!(
            score(&triggers(), &ctx).to_string(),
            "file_type docx (+3), keyword invoice (+2)"
        );
        assert_eq!(
            ScoreBreakdown::default().to_string(),
            "no trigger matched"
        );
    }
}
