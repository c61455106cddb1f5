//! Typed configuration for the Bulwark request pipeline.
//!
//! Every pipeline stage is configured through one [`BulwarkConfig`]:
//!
//! - [`CorsConfig`] - origin policy and the paths it applies to
//! - [`XssConfig`] / [`SqlInjectionConfig`] - signature sets for the inspectors
//! - [`SecurityHeadersConfig`] - values for the injected response headers
//! - [`LoggingConfig`] - access-log destination, truncation and masking
//! - [`EnvelopeConfig`] - result code format and timestamps
//! - [`TraceConfig`] / [`CaptureConfig`] - trace header and body limits
//! - [`TelemetryConfig`] - process logging and Prometheus metrics
//!
//! Unknown fields are rejected everywhere.
//!
//! # Example
//!
//! ```no_run
//! use bulwark_config::ConfigLoader;
//!
//! # fn main() -> Result<(), bulwark_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("bulwark.toml")?
//!     .with_env_prefix("BULWARK")
//!     .load()?;
//!
//! println!("CORS applies to {:?}", config.cors.path_patterns);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [cors]
//! path_patterns = ["/api/**"]
//! allowed_origins = ["https://app.example.com"]
//! allowed_methods = ["GET", "POST"]
//! max_age_secs = 3600
//!
//! [xss]
//! enabled = true
//! empty_policy = "fail_open"
//!
//! [sql_injection]
//! signatures = ["(?:')|(?:--)", "\\bunion\\b.*\\bselect\\b"]
//!
//! [security_headers]
//! frame_options = "SAMEORIGIN"
//!
//! [logging]
//! destination = "http"
//! http_url = "http://loki:3100/loki/api/v1/push"
//! max_size = 2048
//! sensitive_fields = ["password", "token"]
//! skip_path_prefixes = ["/health"]
//!
//! [envelope]
//! result_code_format = "numeric"
//! include_timestamp = true
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY`; lists are
//! comma-separated:
//!
//! - `BULWARK__CORS__ALLOWED_ORIGINS=https://a.com,https://b.com`
//! - `BULWARK__LOGGING__MAX_SIZE=4096`
//! - `BULWARK__TELEMETRY__LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::*;

pub use bulwark_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};
