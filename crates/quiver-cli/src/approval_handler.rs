//! Terminal approvers for `quiver run`.

use std::io::{BufRead, IsTerminal, Write};

use async_trait::async_trait;
use quiver_broker::{ApprovalDecision, ApprovalRequest, Approver};

use crate::theme::Theme;

/// Approves everything; selected with `--yes`.
pub(crate) struct AutoApprover;

#[async_trait]
impl Approver for AutoApprover {
    async fn decide(&self, _request: &ApprovalRequest) -> Option<ApprovalDecision> {
        Some(ApprovalDecision::Approved {
            approver: "cli --yes".to_owned(),
        })
    }
}

/// Asks on the controlling terminal.
pub(crate) struct TerminalApprover;

impl TerminalApprover {
    /// A terminal approver when stdin is interactive.
    pub(crate) fn if_interactive() -> Option<Self> {
        std::io::stdin().is_terminal().then_some(Self)
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn decide(&self, request: &ApprovalRequest) -> Option<ApprovalDecision> {
        let question = prompt_text(request);
        let answer = tokio::task::spawn_blocking(move || ask(&question)).await.ok()??;
        Some(parse_answer(&answer))
    }
}

fn prompt_text(request: &ApprovalRequest) -> String {
    let mut text = format!(
        "\n{}\n  {}\n",
        Theme::header("Confirmation required"),
        request.action
    );
    if let Some(prompt) = &request.prompt {
        text.push_str(&format!("  {}\n", Theme::dimmed(prompt)));
    }
    text.push_str("Allow? [y/N] ");
    text
}

fn ask(question: &str) -> Option<String> {
    let mut stderr = std::io::stderr();
    stderr.write_all(question.as_bytes()).ok()?;
    stderr.flush().ok()?;
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line).ok()?;
    (read > 0).then_some(line)
}

fn parse_answer(answer: &str) -> ApprovalDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Approved {
            approver: "terminal".to_owned(),
        },
        _ => ApprovalDecision::Denied {
            reason: Some("declined at the terminal".to_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(matches!(parse_answer("y\n"), ApprovalDecision::Approved { .. }));
        assert!(matches!(parse_answer(" YES "), ApprovalDecision::Approved { .. }));
        assert!(matches!(parse_answer("\n"), ApprovalDecision::Denied { .. }));
        assert!(matches!(parse_answer("nope"), ApprovalDecision::Denied { .. }));
    }
}
