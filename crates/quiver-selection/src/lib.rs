#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Deterministic capability selection for the Quiver runtime.
//!
//! The engine works on [`PackageHeader`](quiver_package::PackageHeader)s so
//! packages can be chosen before their tools and schemas are loaded.
//! Scores are additive:
//!
//! | Trigger | Points |
//! |---|---|
//! | declared file type carried by the task | 3 |
//! | declared keyword mentioned in the task text | 2 |
//! | declared intent derived by the host | 1 |
//!
//! # Example
//!
//! ```rust
//! use quiver_selection::{SelectionOptions, TaskContext, select};
//!
//! let ctx = TaskContext::new("extract tables").with_file("report.pdf");
//! let selection = select(&ctx, &[], &SelectionOptions::default()).unwrap();
//! assert!(selection.selected.is_empty());
//! ```

pub mod prelude;

pub mod context;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod score;

pub use context::TaskContext;
pub use engine::{DEFAULT_THRESHOLD, ScoredCandidate, Selection, SelectionOptions, select};
pub use error::{SelectionError, SelectionResult};
pub use evaluate::{EvaluationReport, ExampleOutcome, evaluate_examples};
pub use score::{ScoreBreakdown, score};
