//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_test::prelude::*;` to import all essential types.

pub use crate::fixtures::{PackageFixture, ToolFixture, calls_script, result_script};
pub use crate::mocks::{CountingAlarm, EchoToolHost, FailingSink, MockApprover};
