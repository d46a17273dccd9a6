//! Commonly used configuration types.
//!
//! ```
//! use quiver_config::prelude::*;
//! ```

pub use crate::{Config, ConfigError, ConfigResult, LoadedConfig};
pub use crate::{
    AuditSection, BoundarySection, ConcurrencySection, CredentialSection, IsolationMode,
    LimitsSection, LoggingSection, PolicySection, RuntimeSection, SelectionSection,
};
