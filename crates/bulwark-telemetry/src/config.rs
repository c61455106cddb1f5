//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;
use serde::{Deserialize, Serialize};

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name attached to startup logs.
    pub service_name: String,

    /// Logging configuration.
    pub logging: LogConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "bulwark".to_string(),
            logging: LogConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// Development preset: pretty logs, no metrics listener.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LogConfig::development(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "bulwark");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_nested_sections() {
        let config: TelemetryConfig = serde_json::from_str(
            r#"{"service_name":"edge","metrics":{"enabled":true,"addr":"127.0.0.1:9100"}}"#,
        )
        .unwrap();
        assert_eq!(config.service_name, "edge");
        assert_eq!(config.metrics.addr, "127.0.0.1:9100");
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = serde_json::from_str::<TelemetryConfig>(r#"{"tracing":{}}"#);
        assert!(result.is_err());
    }
}
