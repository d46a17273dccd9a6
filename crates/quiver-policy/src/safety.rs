//! Safety gating.
//!
//! Permission says whether an action may happen at all; safety says whether
//! a human must approve it first. A gated category is only consulted after
//! the permission check grants the action.

use quiver_package::{ActionCategory, ConfirmationLevel, SafetyPolicy, ToolDefinition};

use crate::action::RequestedAction;

/// First category of `action` that `safety` gates, if any.
///
/// Categories are checked most specific first, so overwriting a file under a
/// policy that gates both `destructive_write` and `filesystem_write`
/// reports `destructive_write`.
#[must_use]
pub fn requires_confirmation(
    safety: &SafetyPolicy,
    action: &RequestedAction,
) -> Option<ActionCategory> {
    action
        .categories()
        .iter()
        .copied()
        .find(|c| safety.requires(*c))
}

/// Whether invoking `tool` itself must be approved before dispatch.
///
/// `required` always gates. `recommended` gates only when the host runs
/// with strict confirmation.
#[must_use]
pub fn tool_requires_confirmation(tool: &ToolDefinition, strict: bool) -> bool {
    match tool.confirmation_level() {
        ConfirmationLevel::Required => true,
        ConfirmationLevel::Recommended => strict,
        ConfirmationLevel::None => false,
    }
}
