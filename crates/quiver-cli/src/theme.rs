//! Terminal styling for quiver output.

use colored::{ColoredString, Colorize};
use quiver_package::ConfirmationLevel;

/// Width of the table rule under column headings.
const RULE_WIDTH: usize = 64;

/// Styling helpers shared by the commands.
pub(crate) struct Theme;

impl Theme {
    /// Section heading.
    pub(crate) fn header(text: &str) -> String {
        text.bold().cyan().to_string()
    }

    pub(crate) fn success(text: &str) -> String {
        format!("{} {text}", "✓".green())
    }

    /// A failed envelope or check, labelled with its error kind.
    pub(crate) fn failure(kind: &str, message: &str) -> String {
        format!("{} {} {}", "✗".red(), kind.red().bold(), message.red())
    }

    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    pub(crate) fn info(text: &str) -> String {
        format!("{} {text}", "i".blue())
    }

    pub(crate) fn dimmed(text: &str) -> String {
        text.dimmed().to_string()
    }

    /// Rule drawn under table headings.
    pub(crate) fn rule() -> String {
        "━".repeat(RULE_WIDTH).dimmed().to_string()
    }

    /// PASS or FAIL marker for an evaluation example.
    pub(crate) fn verdict(passed: bool) -> ColoredString {
        if passed { "PASS".green() } else { "FAIL".red() }
    }

    /// A selection score, green when it reaches `threshold`.
    pub(crate) fn score(score: u32, threshold: u32) -> ColoredString {
        let text = format!("{score:>3}");
        if score >= threshold {
            text.green()
        } else {
            text.dimmed()
        }
    }

    /// Confirmation column of the tool table.
    pub(crate) fn confirmation(level: ConfirmationLevel) -> ColoredString {
        match level {
            ConfirmationLevel::None => "-".normal(),
            ConfirmationLevel::Recommended => "recommended".yellow(),
            ConfirmationLevel::Required => "required".red(),
        }
    }
}
