//! Out-of-band confirmation.
//!
//! The broker asks an [`Approver`] before gated actions. An approver that
//! does not answer within the confirmation timeout, or the absence of any
//! approver, counts as "not confirmed": the action is refused with
//! `confirmation_required` and the state is recorded in audit.

use std::time::Duration;

use async_trait::async_trait;
use quiver_audit::ApprovalState;
use quiver_core::{ErrorKind, ExecutionError, RequestId};
use quiver_package::ActionCategory;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What the approver is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request asking.
    pub request_id: RequestId,
    /// Capability package name.
    pub capability: String,
    /// Tool name.
    pub tool: String,
    /// Gated category; `None` when the tool itself is gated.
    pub category: Option<ActionCategory>,
    /// Human-readable description of the action.
    pub action: String,
    /// Prompt declared by the tool, if any.
    pub prompt: Option<String>,
}

/// An approver's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Go ahead.
    Approved {
        /// Who approved.
        approver: String,
    },
    /// Refused.
    Denied {
        /// Reason, if given.
        reason: Option<String>,
    },
}

/// Something that can confirm actions, usually a human behind the host UI.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Decide on `request`. `None` means no decision can be made (the
    /// approver is gone or has no channel to a human).
    async fn decide(&self, request: &ApprovalRequest) -> Option<ApprovalDecision>;
}

/// Ask `approver` about `request`, waiting at most `timeout`.
pub(crate) async fn seek_approval(
    approver: Option<&dyn Approver>,
    request: &ApprovalRequest,
    timeout: Duration,
) -> ApprovalState {
    let Some(approver) = approver else {
        warn!(request_id = %request.request_id, action = %request.action, "no approver available");
        return ApprovalState::Unavailable;
    };
    match tokio::time::timeout(timeout, approver.decide(request)).await {
        Ok(Some(ApprovalDecision::Approved { approver })) => {
            info!(request_id = %request.request_id, action = %request.action, %approver, "action approved");
            ApprovalState::Approved { approver }
        },
        Ok(Some(ApprovalDecision::Denied { reason })) => {
            info!(request_id = %request.request_id, action = %request.action, ?reason, "action denied by approver");
            ApprovalState::Denied { reason }
        },
        Ok(None) => ApprovalState::Unavailable,
        Err(_) => {
            warn!(
                request_id = %request.request_id,
                action = %request.action,
                timeout_secs = timeout.as_secs(),
                "confirmation timed out"
            );
            ApprovalState::TimedOut
        },
    }
}

/// The envelope error for an action whose confirmation ended in `state`.
#[must_use]
pub fn confirmation_error(state: &ApprovalState, action: &str) -> ExecutionError {
    let detail = match state {
        ApprovalState::Denied {
            reason: Some(reason),
        } => format!("denied: {reason}"),
        ApprovalState::Denied { reason: None } => "denied".to_owned(),
        ApprovalState::TimedOut => "no answer before the confirmation timeout".to_owned(),
        ApprovalState::Unavailable => "no approver available".to_owned(),
        ApprovalState::NotRequired | ApprovalState::Approved { .. } => "not confirmed".to_owned(),
    };
    ExecutionError::new(
        ErrorKind::ConfirmationRequired,
        format!("{action} requires confirmation ({detail})"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<ApprovalDecision>, Duration);

    #[async_trait]
    impl Approver for Fixed {
        async fn decide(&self, _request: &ApprovalRequest) -> Option<ApprovalDecision> {
            tokio::time::sleep(self.1).await;
            self.0.clone()
        }
    }

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            request_id: RequestId::new(),
            capability: "pdf-tools".to_owned(),
            tool: "extract".to_owned(),
            category: Some(ActionCategory::DestructiveWrite),
            action: "overwrite out/a.txt".to_owned(),
            prompt: None,
        }
    }

    #[tokio::test]
    async fn test_states() {
        let approve = Fixed(
            Some(ApprovalDecision::Approved {
                approver: "alice".to_owned(),
            }),
            Duration::ZERO,
        );
        let state = seek_approval(Some(&approve), &request(), Duration::from_secs(1)).await;
        assert_eq!(
            state,
            ApprovalState::Approved {
                approver: "alice".to_owned()
            }
        );

        let deny = Fixed(Some(ApprovalDecision::Denied { reason: None }), Duration::ZERO);
        let state = seek_approval(Some(&deny), &request(), Duration::from_secs(1)).await;
        assert!(!state.is_approved());

        let silent = Fixed(None, Duration::ZERO);
        let state = seek_approval(Some(&silent), &request(), Duration::from_secs(1)).await;
        assert_eq!(state, ApprovalState::Unavailable);

        let state = seek_approval(None, &request(), Duration::from_secs(1)).await;
        assert_eq!(state, ApprovalState::Unavailable);
    }

    #[tokio::test]
    async fn test_timeout() {
        let slow = Fixed(
            Some(ApprovalDecision::Approved {
                approver: "late".to_owned(),
            }),
            Duration::from_secs(5),
        );
        let state = seek_approval(Some(&slow), &request(), Duration::from_millis(20)).await;
        assert_eq!(state, ApprovalState::TimedOut);

        let err = confirmation_error(&state, "overwrite out/a.txt");
        assert_eq!(err.kind, ErrorKind::ConfirmationRequired);
        assert!(err.message.contains("timeout"));
    }
}
