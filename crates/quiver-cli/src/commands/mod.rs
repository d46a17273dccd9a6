//! Subcommand implementations.

pub(crate) mod cache;
pub(crate) mod run;
pub(crate) mod select;
pub(crate) mod tools;
pub(crate) mod validate;
