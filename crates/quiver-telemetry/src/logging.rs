//! `tracing-subscriber` installation.
//!
//! Log output always goes to stderr. Stdout belongs to the CLI, which prints
//! execution envelopes there.

use std::str::FromStr;

use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::{TelemetryError, TelemetryResult};

/// Line format of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading by eye.
    Pretty,
    /// One short line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
    /// One line with every span field.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            "json" => Self::Json,
            "full" => Self::Full,
            other => {
                return Err(TelemetryError::InvalidSetting(format!(
                    "log format `{other}` (use pretty, compact, json or full)"
                )));
            },
        })
    }
}

/// What to log and how.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level, e.g. `info`.
    pub level: String,
    /// Event format.
    pub format: LogFormat,
    /// Per-target overrides such as `quiver_sandbox=debug`.
    pub directives: Vec<String>,
    /// Colour output for the text formats.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Compact, coloured output at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::Compact,
            directives: Vec::new(),
            ansi: true,
        }
    }

    /// Use `format`.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a per-target override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::InvalidSetting(e.to_string()))?;
        for directive in &self.directives {
            let directive: Directive = directive
                .parse()
                .map_err(|e: ParseError| TelemetryError::InvalidSetting(e.to_string()))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

#[cfg(feature = "config")]
impl From<&quiver_config::LoggingSection> for LogConfig {
    /// An unknown format in the file falls back to compact; the config
    /// validator already reports it.
    fn from(section: &quiver_config::LoggingSection) -> Self {
        Self {
            level: section.level.clone(),
            format: section.format.parse().unwrap_or_default(),
            directives: section.directives.clone(),
            ansi: true,
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// [`TelemetryError::InvalidSetting`] for a bad level or directive,
/// [`TelemetryError::AlreadyInitialized`] when called twice.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi);
    let layer = match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().with_ansi(false).boxed(),
        LogFormat::Full => base.boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
