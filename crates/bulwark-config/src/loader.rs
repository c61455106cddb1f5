//! Layered configuration loader.
//!
//! Layers, applied in order:
//! 1. Defaults (or a preset)
//! 2. A TOML or JSON file, or an in-memory string
//! 3. Environment variables `PREFIX__SECTION__KEY`
//!
//! A file or string replaces the configuration built so far as a whole:
//! fields it leaves out take their defaults, not the preset's values.
//! Environment variables override single fields of whatever came before.
//!
//! List values in environment variables are comma-separated.

use std::env;
use std::fs;
use std::path::Path;

use bulwark_core::{EmptySignaturePolicy, ResultCodeFormat, SignatureSet};
use bulwark_telemetry::LogFormat;

use crate::{BulwarkConfig, ConfigError, LogDestination};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "BULWARK";

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use bulwark_config::ConfigLoader;
///
/// # fn main() -> Result<(), bulwark_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("bulwark.toml")?
///     .with_env_prefix("BULWARK")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: BulwarkConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BulwarkConfig::default(),
            env_prefix: None,
        }
    }

    /// Reset to default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = BulwarkConfig::default();
        self
    }

    /// Start from the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use bulwark_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = BulwarkConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = BulwarkConfig::production();
        self
    }

    /// Load configuration from a `.toml` or `.json` file.
    ///
    /// Replaces any preset or earlier file; omitted fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `toml` or `json` format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use bulwark_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [cors]
    ///     allowed_origins = ["https://app.example.com"]
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.cors.allowed_origins, vec!["https://app.example.com"]);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation
    /// fails.
    pub fn load(mut self) -> Result<BulwarkConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> BulwarkConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<BulwarkConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // CORS
            ["CORS", "ENABLED"] => config.cors.enabled = bool_var(key, value)?,
            ["CORS", "PATH_PATTERNS"] => config.cors.path_patterns = parse_list(value),
            ["CORS", "ALLOWED_ORIGINS"] => config.cors.allowed_origins = parse_list(value),
            ["CORS", "ALLOWED_METHODS"] => config.cors.allowed_methods = parse_list(value),
            ["CORS", "ALLOWED_HEADERS"] => config.cors.allowed_headers = parse_list(value),
            ["CORS", "EXPOSED_HEADERS"] => config.cors.exposed_headers = parse_list(value),
            ["CORS", "ALLOW_CREDENTIALS"] => config.cors.allow_credentials = bool_var(key, value)?,
            ["CORS", "MAX_AGE_SECS"] => {
                config.cors.max_age_secs = if value.is_empty() || value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(value.parse().map_err(|_| {
                        ConfigError::env_parse_error(key, "expected integer or 'none'")
                    })?)
                };
            }

            // Inspectors
            ["XSS", "ENABLED"] => config.xss.enabled = bool_var(key, value)?,
            ["XSS", "SIGNATURES"] => config.xss.signatures = SignatureSet::new(parse_list(value)),
            ["XSS", "EMPTY_POLICY"] => config.xss.empty_policy = policy_var(key, value)?,
            ["SQL_INJECTION", "ENABLED"] => config.sql_injection.enabled = bool_var(key, value)?,
            ["SQL_INJECTION", "SIGNATURES"] => {
                config.sql_injection.signatures = SignatureSet::new(parse_list(value));
            }
            ["SQL_INJECTION", "EMPTY_POLICY"] => {
                config.sql_injection.empty_policy = policy_var(key, value)?;
            }

            // Security headers
            ["SECURITY_HEADERS", "ENABLED"] => {
                config.security_headers.enabled = bool_var(key, value)?;
            }
            ["SECURITY_HEADERS", "FRAME_OPTIONS"] => {
                config.security_headers.frame_options = value.to_string();
            }
            ["SECURITY_HEADERS", "XSS_PROTECTION"] => {
                config.security_headers.xss_protection = value.to_string();
            }
            ["SECURITY_HEADERS", "CONTENT_TYPE_OPTIONS"] => {
                config.security_headers.content_type_options = value.to_string();
            }

            // Logging
            ["LOGGING", "ENABLED"] => config.logging.enabled = bool_var(key, value)?,
            ["LOGGING", "DESTINATION"] => {
                config.logging.destination = match value.to_lowercase().as_str() {
                    "tracing" => LogDestination::Tracing,
                    "http" => LogDestination::Http,
                    "none" => LogDestination::None,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'tracing', 'http', or 'none'",
                        ))
                    }
                };
            }
            ["LOGGING", "HTTP_URL"] => {
                config.logging.http_url = (!value.is_empty()).then(|| value.to_string());
            }
            ["LOGGING", "HTTP_TIMEOUT_MS"] => config.logging.http_timeout_ms = int_var(key, value)?,
            ["LOGGING", "MAX_SIZE"] => config.logging.max_size = int_var(key, value)?,
            ["LOGGING", "SENSITIVE_FIELDS"] => config.logging.sensitive_fields = parse_list(value),
            ["LOGGING", "LOG_REQUEST_BODY"] => {
                config.logging.log_request_body = bool_var(key, value)?;
            }
            ["LOGGING", "LOG_RESPONSE_BODY"] => {
                config.logging.log_response_body = bool_var(key, value)?;
            }
            ["LOGGING", "SKIP_PATH_PREFIXES"] => {
                config.logging.skip_path_prefixes = parse_list(value);
            }
            ["LOGGING", "SKIP_PATH_SUFFIXES"] => {
                config.logging.skip_path_suffixes = parse_list(value);
            }

            // Envelope
            ["ENVELOPE", "RESULT_CODE_FORMAT"] => {
                config.envelope.result_code_format = match value.to_lowercase().as_str() {
                    "symbolic" => ResultCodeFormat::Symbolic,
                    "numeric" => ResultCodeFormat::Numeric,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'symbolic' or 'numeric'",
                        ))
                    }
                };
            }
            ["ENVELOPE", "INCLUDE_TIMESTAMP"] => {
                config.envelope.include_timestamp = bool_var(key, value)?;
            }
            ["ENVELOPE", "TIMESTAMP_FORMAT"] => config.envelope.timestamp_format = value.to_string(),
            ["ENVELOPE", "PRETTY"] => config.envelope.pretty = bool_var(key, value)?,

            // Trace
            ["TRACE", "HEADER"] => config.trace.header = value.to_string(),
            ["TRACE", "TRUST_INCOMING"] => config.trace.trust_incoming = bool_var(key, value)?,

            // Capture
            ["CAPTURE", "MAX_BODY_BYTES"] => {
                config.capture.max_body_bytes = if value.is_empty() || value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(int_var(key, value)?)
                };
            }

            // Telemetry
            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    "compact" => LogFormat::Compact,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json', 'pretty', or 'compact'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                config.telemetry.logging.ansi_enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                config.telemetry.logging.include_location = bool_var(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => config.telemetry.metrics.addr = value.to_string(),

            // Unknown key - ignore
            _ => {}
        }
        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, trimming and dropping blanks.
fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn int_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn policy_var(key: &str, value: &str) -> Result<EmptySignaturePolicy, ConfigError> {
    match value.to_lowercase().as_str() {
        "fail_open" => Ok(EmptySignaturePolicy::FailOpen),
        "fail_closed" => Ok(EmptySignaturePolicy::FailClosed),
        _ => Err(ConfigError::env_parse_error(
            key,
            "expected 'fail_open' or 'fail_closed'",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, BulwarkConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
        assert!(config.envelope.include_timestamp);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"logging": {"max_size": 10, "sensitive_fields": ["password", "ssn"]}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.logging.max_size, 10);
        assert_eq!(config.logging.sensitive_fields, vec!["password", "ssn"]);
    }

    #[test]
    fn test_loader_rejects_unknown_section() {
        let result = ConfigLoader::new().with_string("[firewall]\nenabled = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/bulwark.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/bulwark.toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.cors.enabled);
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[logging]\nmax_size = 0", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }

    // Overrides are driven through apply_env_var; the process environment is left alone.
    #[test]
    fn test_apply_env_var_lists() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__CORS__ALLOWED_ORIGINS", "https://a.com, https://b.com", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__LOGGING__SENSITIVE_FIELDS", "password,token", "TEST")
            .unwrap();
        assert_eq!(loader.config.cors.allowed_origins, vec!["https://a.com", "https://b.com"]);
        assert_eq!(loader.config.logging.sensitive_fields, vec!["password", "token"]);
    }

    #[test]
    fn test_apply_env_var_scalars() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__XSS__ENABLED", "false", "TEST").unwrap();
        loader.apply_env_var("TEST__SQL_INJECTION__EMPTY_POLICY", "fail_closed", "TEST").unwrap();
        loader.apply_env_var("TEST__ENVELOPE__RESULT_CODE_FORMAT", "numeric", "TEST").unwrap();
        loader.apply_env_var("TEST__CAPTURE__MAX_BODY_BYTES", "65536", "TEST").unwrap();
        loader.apply_env_var("TEST__TELEMETRY__METRICS__ADDR", "127.0.0.1:9100", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert!(!config.xss.enabled);
        assert_eq!(config.sql_injection.empty_policy, EmptySignaturePolicy::FailClosed);
        assert_eq!(config.envelope.result_code_format, ResultCodeFormat::Numeric);
        assert_eq!(config.capture.max_body_bytes, Some(65536));
        assert_eq!(config.telemetry.metrics.addr, "127.0.0.1:9100");
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__LOGGING__MAX_SIZE", "big", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__CORS__ENABLED", "maybe", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__LOGGING__DESTINATION", "kafka", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__UNKNOWN__KEY", "x", "TEST").is_ok());
    }
}
