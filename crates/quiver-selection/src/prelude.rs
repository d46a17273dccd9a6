//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_selection::prelude::*;` to import all essential types.

pub use crate::{
    ScoredCandidate, Selection, SelectionError, SelectionOptions, SelectionResult, TaskContext,
    evaluate_examples, select,
};
