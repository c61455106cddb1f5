//! Configuration schema types.
//!
//! One section per filter plus the envelope, trace id, capture and
//! telemetry settings. Every section rejects unknown fields and fills
//! missing ones with defaults.

use bulwark_core::envelope::DEFAULT_TIMESTAMP_FORMAT;
use bulwark_core::signatures::{default_sql_injection_signatures, default_xss_signatures};
use bulwark_core::{EmptySignaturePolicy, ResultCodeFormat, SignatureSet};
use serde::{Deserialize, Serialize};

/// The CORS wildcard.
pub const WILDCARD: &str = "*";

/// CORS section.
///
/// The same policy is bound to every pattern in `path_patterns`.
///
/// # Example
///
/// ```
/// use bulwark_config::CorsConfig;
///
/// let config = CorsConfig::default();
/// assert_eq!(config.allowed_origins, vec!["*"]);
/// assert_eq!(config.path_patterns, vec!["/**"]);
/// assert!(config.allow_credentials);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Whether the CORS stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path patterns the policy applies to (`/**`, `/api/**`, `/exact`).
    #[serde(default = "default_path_patterns")]
    pub path_patterns: Vec<String>,

    /// Allowed origins, `scheme://host[:port]` or `*`.
    #[serde(default = "default_wildcard")]
    pub allowed_origins: Vec<String>,

    /// Allowed methods, matched exactly.
    #[serde(default = "default_wildcard")]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers, matched case-insensitively.
    #[serde(default = "default_wildcard")]
    pub allowed_headers: Vec<String>,

    /// Headers exposed to the browser.
    #[serde(default)]
    pub exposed_headers: Vec<String>,

    /// Whether credentials are allowed.
    #[serde(default = "default_true")]
    pub allow_credentials: bool,

    /// Preflight cache duration. `None` omits `Access-Control-Max-Age`.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_patterns: default_path_patterns(),
            allowed_origins: default_wildcard(),
            allowed_methods: default_wildcard(),
            allowed_headers: default_wildcard(),
            exposed_headers: Vec::new(),
            allow_credentials: true,
            max_age_secs: None,
        }
    }
}

fn default_path_patterns() -> Vec<String> {
    vec!["/**".to_string()]
}

fn default_wildcard() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

/// XSS inspector section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct XssConfig {
    /// Whether the XSS stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Signature fragments. Replaces the built-in catalog when given.
    #[serde(default = "default_xss_signatures")]
    pub signatures: SignatureSet,

    /// Behavior of an empty signature list.
    #[serde(default)]
    pub empty_policy: EmptySignaturePolicy,
}

impl Default for XssConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signatures: default_xss_signatures(),
            empty_policy: EmptySignaturePolicy::default(),
        }
    }
}

/// SQL injection inspector section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SqlInjectionConfig {
    /// Whether the SQL injection stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Signature fragments. Replaces the built-in catalog when given.
    #[serde(default = "default_sql_injection_signatures")]
    pub signatures: SignatureSet,

    /// Behavior of an empty signature list.
    #[serde(default)]
    pub empty_policy: EmptySignaturePolicy,
}

impl Default for SqlInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signatures: default_sql_injection_signatures(),
            empty_policy: EmptySignaturePolicy::default(),
        }
    }
}

/// Security headers section. A blank value disables that header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecurityHeadersConfig {
    /// Whether the security headers stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `X-Frame-Options` value.
    #[serde(default = "default_frame_options")]
    pub frame_options: String,

    /// `X-XSS-Protection` value.
    #[serde(default = "default_xss_protection")]
    pub xss_protection: String,

    /// `X-Content-Type-Options` value.
    #[serde(default = "default_content_type_options")]
    pub content_type_options: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_options: default_frame_options(),
            xss_protection: default_xss_protection(),
            content_type_options: default_content_type_options(),
        }
    }
}

fn default_frame_options() -> String {
    "DENY".to_string()
}

fn default_xss_protection() -> String {
    "1; mode=block".to_string()
}

fn default_content_type_options() -> String {
    "nosniff".to_string()
}

/// Where access-log records go.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogDestination {
    /// `tracing` events on the `bulwark::access` target.
    #[default]
    Tracing,
    /// JSON POST to `http_url`.
    Http,
    /// Records are built and discarded.
    None,
}

/// Access logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether the logging stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Record destination.
    #[serde(default)]
    pub destination: LogDestination,

    /// Collector URL for the `http` destination.
    #[serde(default)]
    pub http_url: Option<String>,

    /// Collector request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Maximum logged body length in characters.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// JSON string fields whose values are masked.
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,

    /// Whether request bodies are logged.
    #[serde(default = "default_true")]
    pub log_request_body: bool,

    /// Whether response bodies are logged.
    #[serde(default = "default_true")]
    pub log_response_body: bool,

    /// Paths starting with any of these are not logged.
    #[serde(default = "default_skip_prefixes")]
    pub skip_path_prefixes: Vec<String>,

    /// Paths ending with any of these are not logged.
    #[serde(default = "default_skip_suffixes")]
    pub skip_path_suffixes: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: LogDestination::default(),
            http_url: None,
            http_timeout_ms: default_http_timeout_ms(),
            max_size: default_max_size(),
            sensitive_fields: default_sensitive_fields(),
            log_request_body: true,
            log_response_body: true,
            skip_path_prefixes: default_skip_prefixes(),
            skip_path_suffixes: default_skip_suffixes(),
        }
    }
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_max_size() -> usize {
    1024
}

fn default_sensitive_fields() -> Vec<String> {
    vec!["password".to_string()]
}

fn default_skip_prefixes() -> Vec<String> {
    vec!["/static/".to_string(), "/assets/".to_string()]
}

fn default_skip_suffixes() -> Vec<String> {
    vec![".css".to_string(), ".js".to_string()]
}

/// Response envelope section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeConfig {
    /// Symbolic or numeric `resultCode`.
    #[serde(default)]
    pub result_code_format: ResultCodeFormat,

    /// Whether envelopes carry a `timestamp`.
    #[serde(default)]
    pub include_timestamp: bool,

    /// `strftime` format of the timestamp.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    /// Whether envelopes are pretty printed.
    #[serde(default)]
    pub pretty: bool,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            result_code_format: ResultCodeFormat::default(),
            include_timestamp: false,
            timestamp_format: default_timestamp_format(),
            pretty: false,
        }
    }
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

/// Trace id section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TraceConfig {
    /// Propagation header.
    #[serde(default = "default_trace_header")]
    pub header: String,

    /// Whether ids supplied by clients are accepted.
    #[serde(default = "default_true")]
    pub trust_incoming: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            header: default_trace_header(),
            trust_incoming: true,
        }
    }
}

fn default_trace_header() -> String {
    "x-trace-id".to_string()
}

/// Request body capture section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Requests with larger bodies are answered with the internal-error
    /// envelope. `None` means unlimited.
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

fn default_true() -> bool {
    true
}
