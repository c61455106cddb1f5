//! Main configuration type.

use bulwark_core::EnvelopeSerializer;
use bulwark_telemetry::{LogConfig, TelemetryConfig};
use http::{HeaderName, HeaderValue, Uri};
use serde::{Deserialize, Serialize};

use crate::{
    CaptureConfig, ConfigError, CorsConfig, EnvelopeConfig, LogDestination, LoggingConfig,
    SecurityHeadersConfig, SqlInjectionConfig, TraceConfig, XssConfig,
};

/// Complete Bulwark configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use bulwark_config::BulwarkConfig;
///
/// let config = BulwarkConfig::default();
/// assert!(config.cors.enabled);
/// assert_eq!(config.logging.max_size, 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BulwarkConfig {
    /// CORS filter.
    #[serde(default)]
    pub cors: CorsConfig,

    /// XSS filter.
    #[serde(default)]
    pub xss: XssConfig,

    /// SQL injection filter.
    #[serde(default)]
    pub sql_injection: SqlInjectionConfig,

    /// Security headers filter.
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,

    /// Access logging filter.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Response envelope.
    #[serde(default)]
    pub envelope: EnvelopeConfig,

    /// Trace id propagation.
    #[serde(default)]
    pub trace: TraceConfig,

    /// Request body capture.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Process-wide logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BulwarkConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found:
    /// - `logging.max_size` is zero
    /// - the `http` destination has no parseable `http_url`
    /// - a signature fragment does not compile
    /// - a security header or the trace header is not a valid header
    /// - the timestamp format is invalid
    /// - the metrics address does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.max_size == 0 {
            return Err(ConfigError::invalid_value(
                "logging.max_size",
                "must be greater than 0",
            ));
        }

        if self.logging.enabled && self.logging.destination == LogDestination::Http {
            let url = self.logging.http_url.as_deref().ok_or_else(|| {
                ConfigError::validation_error(
                    "logging.http_url must be set when destination is 'http'",
                )
            })?;
            validate_http_url(url)?;
        }

        if self.cors.enabled && self.cors.path_patterns.is_empty() {
            return Err(ConfigError::invalid_value(
                "cors.path_patterns",
                "at least one pattern is required",
            ));
        }

        if self.xss.enabled {
            self.xss
                .signatures
                .validate()
                .map_err(|e| ConfigError::invalid_value("xss.signatures", e.to_string()))?;
        }

        if self.sql_injection.enabled {
            self.sql_injection
                .signatures
                .validate()
                .map_err(|e| ConfigError::invalid_value("sql_injection.signatures", e.to_string()))?;
        }

        if self.security_headers.enabled {
            for (field, value) in [
                ("security_headers.frame_options", &self.security_headers.frame_options),
                ("security_headers.xss_protection", &self.security_headers.xss_protection),
                (
                    "security_headers.content_type_options",
                    &self.security_headers.content_type_options,
                ),
            ] {
                HeaderValue::from_str(value.trim())
                    .map_err(|_| ConfigError::invalid_value(field, "not a valid header value"))?;
            }
        }

        HeaderName::from_bytes(self.trace.header.trim().to_ascii_lowercase().as_bytes())
            .map_err(|_| ConfigError::invalid_value("trace.header", "not a valid header name"))?;

        EnvelopeSerializer::new()
            .with_timestamp_format(&self.envelope.timestamp_format)
            .map_err(|e| ConfigError::invalid_value("envelope.timestamp_format", e.to_string()))?;

        if self.telemetry.metrics.enabled {
            self.telemetry
                .metrics
                .socket_addr()
                .map_err(|e| ConfigError::invalid_value("telemetry.metrics.addr", e.to_string()))?;
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, request logging to `tracing`.
    ///
    /// # Example
    ///
    /// ```
    /// use bulwark_config::BulwarkConfig;
    ///
    /// let config = BulwarkConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::development();
        config.envelope.pretty = true;
        config
    }

    /// Production preset: JSON logs, timestamps on envelopes.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::production();
        config.envelope.include_timestamp = true;
        config
    }
}

fn validate_http_url(url: &str) -> Result<(), ConfigError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| ConfigError::invalid_value("logging.http_url", format!("{e}")))?;

    match uri.scheme_str() {
        Some("http" | "https") if uri.authority().is_some() => Ok(()),
        _ => Err(ConfigError::invalid_value(
            "logging.http_url",
            "expected an absolute http or https URL",
        )),
    }
}
