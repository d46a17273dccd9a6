//! `use quiver_core::prelude::*;` for identifiers, the result envelope and naming.

pub use crate::{
    CallId, CallerIdentity, ErrorKind, ExecutionError, ExecutionResult, Metrics, NameError,
    RequestId, Timestamp, TraceId, validate_name,
};
