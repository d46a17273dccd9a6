//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_sandbox::prelude::*;` to import all essential types.

pub use crate::{
    AsyncHandle, BrokerCall, BrokerPort, CallResponse, ExecutionRequest, HandleStatus, Redactor,
    SandboxConfig, SandboxError, SandboxOutcome, SandboxResult, SandboxRuntime, SandboxState,
};
