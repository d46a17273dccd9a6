//! Prelude module - commonly used types for convenient import.
//!
//! Use `use quiver_broker::prelude::*;` to import all essential types.

pub use crate::{
    ApprovalDecision, ApprovalRequest, Approver, AuditAlarm, BrokerConfig, BrokerError,
    BrokerResult, CapabilityToken, Credential, CredentialStore, ExternalToolHost, Invocation,
    ToolBroker,
};
