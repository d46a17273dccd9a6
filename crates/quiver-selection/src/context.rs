//! Task context handed to the selection engine.

use serde::{Deserialize, Serialize};

/// What the host knows about an incoming task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Free-form task text.
    pub task: String,
    /// Files attached to the task.
    #[serde(default)]
    pub files: Vec<String>,
    /// Host-derived intents.
    #[serde(default)]
    pub intents: Vec<String>,
    /// Capability the caller named explicitly; bypasses scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl TaskContext {
    /// Context for `task` with no files, intents or explicit capability.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    /// Attach a file.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.files.push(file.into());
        self
    }

    /// Add a host-derived intent.
    #[must_use]
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intents.push(intent.into());
        self
    }

    /// Name a capability explicitly.
    #[must_use]
    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.capability = Some(name.into());
        self
    }

    /// Lowercased file extensions from attached files and file-like words
    /// in the task text, sorted and deduplicated.
    #[must_use]
    pub fn file_extensions(&self) -> Vec<String> {
        let words = self
            .task
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | '"' | '\''))
            .map(|w| w.trim_end_matches(['.', ':', '!', '?']));
        let mut exts: Vec<String> = self
            .files
            .iter()
            .map(String::as_str)
            .chain(words)
            .filter_map(extension_of)
            .collect();
        exts.sort();
        exts.dedup();
        exts
    }
}

fn extension_of(path: &str) -> Option<String> {
    let file = path.rsplit(['/', '\\']).next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_from_files_and_text() {
        let ctx = TaskContext::new("Summarize Q1-Report.PDF and notes.md, please.")
            .with_file("/tmp/data/table.CSV")
            .with_file("README");
        assert_eq!(ctx.file_extensions(), vec!["csv", "md", "pdf"]);
    }

    #[test]
    fn test_sentence_dots_are_not_extensions() {
        let ctx = TaskContext::new("Do it. Then stop... ok .hidden");
        assert!(ctx.file_extensions().is_empty());
    }
}
