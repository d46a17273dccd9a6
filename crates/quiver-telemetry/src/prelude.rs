//! `use quiver_telemetry::prelude::*;` for logging setup and request context.

pub use crate::{LogConfig, LogFormat, RequestContext, TelemetryError, TelemetryResult, setup_logging};
