//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_policy::prelude::*;` to import all essential types.

pub use crate::{
    Decision, DenyReason, EffectiveSummary, ExternalBoundary, PolicyError, PolicyResult,
    RequestedAction, effective_summary, evaluate, requires_confirmation,
};
