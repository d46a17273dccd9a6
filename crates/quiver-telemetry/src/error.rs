use thiserror::Error;

/// Logging could not be installed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A level, directive or format did not parse.
    #[error("invalid logging setting: {0}")]
    InvalidSetting(String),

    /// A global subscriber is already in place.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Result alias for this crate.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
