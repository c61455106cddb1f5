//! Structured logging for Bulwark.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and one
//! formatting layer. Every request handled by the pipeline runs inside a
//! `request` span carrying `trace_id`, `method` and `path`, so those fields
//! appear on every event emitted while the request is in flight.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!(stage = "cors", "policy loaded");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Whether logging is installed at all.
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `bulwark=debug,reqwest=warn`.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Whether to emit ANSI colors.
    pub ansi_enabled: bool,

    /// Whether to include file and line.
    pub include_location: bool,

    /// Whether to include the event target.
    pub include_target: bool,

    /// Whether to log span open and close events.
    pub span_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable output at `debug`.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            ansi_enabled: true,
            include_location: true,
            include_target: true,
            span_events: true,
        }
    }

    /// JSON output at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            ansi_enabled: false,
            include_location: false,
            include_target: true,
            span_events: false,
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a
/// global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_ansi(config.ansi_enabled)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);

    let layer = match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns an error if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// Field names used across Bulwark events.
pub mod fields {
    /// Correlation id.
    pub const TRACE_ID: &str = "trace_id";

    /// Pipeline stage name.
    pub const STAGE: &str = "stage";

    /// Response code name.
    pub const CODE: &str = "code";

    /// Where a signature matched.
    pub const SOURCE: &str = "source";

    /// HTTP status code.
    pub const STATUS: &str = "status";

    /// Log sink name.
    pub const SINK: &str = "sink";
}
