//! Logging and metrics for Bulwark.
//!
//! - **Logging**: a `tracing-subscriber` registry with JSON, pretty or
//!   compact output and an `EnvFilter`
//! - **Metrics**: Prometheus counters for requests, blocked requests and
//!   failed log shipments, exported over HTTP
//!
//! The pipeline crates only call the recording functions in [`metrics`];
//! installing a subscriber or recorder is left to the application.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     init_telemetry(&TelemetryConfig::default()).expect("telemetry");
//!     tracing::info!("bulwark started");
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/bulwark-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(
        service = %config.service_name,
        metrics = config.metrics.enabled,
        "telemetry initialized"
    );
    Ok(())
}
