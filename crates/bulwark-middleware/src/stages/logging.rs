//! Access logging stage.
//!
//! Builds one [`LogRecord`] before the rest of the chain runs and one after,
//! and ships both to a [`LogSink`] on spawned tasks. The client response is
//! never delayed by the sink, and the two records for a request are only
//! correlated by `traceId`; their order at the sink is not guaranteed.
//!
//! Bodies pass through a [`BodyRedactor`]: truncation first, then masking of
//! configured JSON string fields.

use crate::context::MiddlewareContext;
use crate::error::PipelineError;
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::pipeline::Stage;
use crate::sink::{LogSink, TracingSink};
use crate::types::{Request, Response};
use bulwark_core::BodyCapture;
use http::HeaderMap;
use indexmap::IndexMap;
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::sync::Arc;

/// Default body length kept in log records, in characters.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024;

/// Marker appended to truncated bodies.
pub const TRUNCATION_MARKER: &str = "... [TRUNCATED]";

/// Replacement for masked field values.
pub const MASK: &str = "[PROTECTED]";

/// Logged in place of an empty body.
pub const NO_CONTENT: &str = "[No Content]";

/// Path prefixes skipped by default.
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &["/static/", "/assets/"];

/// Path suffixes skipped by default.
pub const DEFAULT_SKIP_SUFFIXES: &[&str] = &[".css", ".js"];

/// Which side of the exchange a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The inbound request.
    Request,
    /// The outbound response.
    Response,
}

/// One access-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Correlation id shared by the request and response records.
    pub trace_id: String,
    /// Request or response.
    pub direction: Direction,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub uri: String,
    /// Raw query string, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Client IP address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    /// Headers of this side, repeated names joined with `", "`.
    pub headers: IndexMap<String, String>,
    /// Redacted body, when body logging is enabled for this side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Response status. Only set on response records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Joins repeated header values with `", "`, keeping first-seen order.
pub fn merge_headers(headers: &HeaderMap) -> IndexMap<String, String> {
    let mut merged: IndexMap<String, String> = IndexMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        merged
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    merged
}

/// Truncates and masks bodies before they are logged.
///
/// Masking is a textual substitution on `"field":"value"` pairs. Values that
/// are not JSON strings, or that were cut by truncation, are left as is.
///
/// # Example
///
/// ```
/// use bulwark_middleware::stages::logging::BodyRedactor;
///
/// let redactor = BodyRedactor::new(1024, ["password"]);
/// assert_eq!(
///     redactor.truncate_and_mask(r#"{"user":"bob","password":"hunter2"}"#),
///     r#"{"user":"bob","password":"[PROTECTED]"}"#
/// );
/// assert_eq!(redactor.truncate_and_mask(""), "[No Content]");
/// ```
#[derive(Debug, Clone)]
pub struct BodyRedactor {
    max_size: usize,
    fields: Vec<(String, Regex)>,
}

impl Default for BodyRedactor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_SIZE, ["password"])
    }
}

impl BodyRedactor {
    /// Creates a redactor. A `max_size` of zero is raised to one.
    pub fn new<I, S>(max_size: usize, sensitive_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = sensitive_fields
            .into_iter()
            .map(Into::into)
            .filter(|field: &String| !field.trim().is_empty())
            .filter_map(|field| {
                let pattern = format!(r#""{}"\s*:\s*"(?:[^"\\]|\\.)*""#, regex::escape(&field));
                match Regex::new(&pattern) {
                    Ok(regex) => Some((field, regex)),
                    Err(err) => {
                        tracing::warn!(field = %field, error = %err, "sensitive field ignored");
                        None
                    }
                }
            })
            .collect();

        Self {
            max_size: max_size.max(1),
            fields,
        }
    }

    /// Returns the maximum body length in characters.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the masked field names.
    pub fn sensitive_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(field, _)| field.as_str())
    }

    /// Applies truncation, then masking.
    #[must_use]
    pub fn truncate_and_mask(&self, body: &str) -> String {
        if body.is_empty() {
            return NO_CONTENT.to_string();
        }

        let mut text = match body.char_indices().nth(self.max_size) {
            Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &body[..cut]),
            None => body.to_string(),
        };

        for (field, regex) in &self.fields {
            let replacement = format!(r#""{field}":"{MASK}""#);
            let masked = regex.replace_all(&text, NoExpand(&replacement)).into_owned();
            text = masked;
        }
        text
    }

    /// Redacts a single inspected value for a log line.
    ///
    /// Values under a sensitive `name` are replaced whole; anything else goes
    /// through [`truncate_and_mask`](Self::truncate_and_mask).
    #[must_use]
    pub fn redact_value(&self, name: Option<&str>, value: &str) -> String {
        match name {
            Some(name) if self.sensitive_fields().any(|field| field == name) => MASK.to_string(),
            _ => self.truncate_and_mask(value),
        }
    }
}

/// Access logging middleware.
///
/// # Example
///
/// ```
/// use bulwark_middleware::sink::ChannelSink;
/// use bulwark_middleware::stages::logging::{BodyRedactor, LoggingMiddleware};
/// use std::sync::Arc;
///
/// let (sink, _rx) = ChannelSink::new(16);
/// let logging = LoggingMiddleware::builder(Arc::new(sink))
///     .redactor(BodyRedactor::new(256, ["password", "token"]))
///     .log_response_body(false)
///     .build();
/// assert!(logging.should_skip("/static/app.js"));
/// assert!(!logging.should_skip("/api/users"));
/// ```
#[derive(Clone)]
pub struct LoggingMiddleware {
    sink: Arc<dyn LogSink>,
    redactor: BodyRedactor,
    log_request_body: bool,
    log_response_body: bool,
    skip_prefixes: Vec<String>,
    skip_suffixes: Vec<String>,
}

impl std::fmt::Debug for LoggingMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("sink", &self.sink.name())
            .field("redactor", &self.redactor)
            .field("log_request_body", &self.log_request_body)
            .field("log_response_body", &self.log_response_body)
            .field("skip_prefixes", &self.skip_prefixes)
            .field("skip_suffixes", &self.skip_suffixes)
            .finish()
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::builder(Arc::new(TracingSink)).build()
    }
}

impl LoggingMiddleware {
    /// Creates a builder shipping to `sink`.
    #[must_use]
    pub fn builder(sink: Arc<dyn LogSink>) -> LoggingBuilder {
        LoggingBuilder {
            sink,
            redactor: BodyRedactor::default(),
            log_request_body: true,
            log_response_body: true,
            skip_prefixes: DEFAULT_SKIP_PREFIXES.iter().map(|s| (*s).to_string()).collect(),
            skip_suffixes: DEFAULT_SKIP_SUFFIXES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Returns true if `path` is a static asset that is not logged.
    #[must_use]
    pub fn should_skip(&self, path: &str) -> bool {
        self.skip_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.skip_suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }

    /// Returns the redactor.
    #[must_use]
    pub fn redactor(&self) -> &BodyRedactor {
        &self.redactor
    }

    fn request_record(&self, ctx: &MiddlewareContext, request: &Request) -> LogRecord {
        LogRecord {
            trace_id: ctx.trace_id().to_string(),
            direction: Direction::Request,
            method: request.method().to_string(),
            uri: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            remote_address: ctx.remote_addr().map(|addr| addr.ip().to_string()),
            headers: merge_headers(request.headers()),
            body: self
                .log_request_body
                .then(|| self.redactor.truncate_and_mask(&request.body_text())),
            status: None,
        }
    }

    fn response_record(&self, request: LogRecord, response: &Response) -> LogRecord {
        LogRecord {
            direction: Direction::Response,
            headers: merge_headers(response.headers()),
            body: self
                .log_response_body
                .then(|| self.redactor.truncate_and_mask(&response.body_text())),
            status: Some(response.status().as_u16()),
            ..request
        }
    }

    fn failure_record(request: LogRecord, err: &PipelineError) -> LogRecord {
        LogRecord {
            direction: Direction::Response,
            headers: IndexMap::new(),
            body: None,
            status: Some(err.response_code().status().as_u16()),
            ..request
        }
    }

    fn ship(&self, record: &LogRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "log record could not be serialized");
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sink = self.sink.name(), "no runtime available, log record dropped");
            return;
        };

        let sink_name = self.sink.name();
        let delivery = self.sink.send_log(json);
        runtime.spawn(async move {
            if let Err(err) = delivery.await {
                tracing::warn!(sink = sink_name, error = %err, "log shipment failed");
                bulwark_telemetry::metrics::record_shipment_failure(sink_name);
            }
        });
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        Stage::Logging.name()
    }

    fn precedence(&self) -> u8 {
        Stage::Logging.precedence()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if self.should_skip(request.uri().path()) {
                return next.run(ctx, request).await;
            }

            let record = self.request_record(ctx, &request);
            self.ship(&record);

            let outcome = next.run(ctx, request).await;

            // Later stages may not change the trace id, but keep the record honest.
            let mut record = match &outcome {
                Ok(response) => self.response_record(record, response),
                Err(err) => Self::failure_record(record, err),
            };
            record.trace_id = ctx.trace_id().to_string();
            self.ship(&record);

            outcome
        })
    }
}

/// Builder for [`LoggingMiddleware`].
#[derive(Clone)]
pub struct LoggingBuilder {
    sink: Arc<dyn LogSink>,
    redactor: BodyRedactor,
    log_request_body: bool,
    log_response_body: bool,
    skip_prefixes: Vec<String>,
    skip_suffixes: Vec<String>,
}

impl LoggingBuilder {
    /// Sets the body redactor.
    pub fn redactor(mut self, redactor: BodyRedactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Whether request bodies are logged.
    pub fn log_request_body(mut self, enabled: bool) -> Self {
        self.log_request_body = enabled;
        self
    }

    /// Whether response bodies are logged.
    pub fn log_response_body(mut self, enabled: bool) -> Self {
        self.log_response_body = enabled;
        self
    }

    /// Replaces the skipped path prefixes.
    pub fn skip_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the skipped path suffixes.
    pub fn skip_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the middleware.
    pub fn build(self) -> LoggingMiddleware {
        LoggingMiddleware {
            sink: self.sink,
            redactor: self.redactor,
            log_request_body: self.log_request_body,
            log_response_body: self.log_response_body,
            skip_prefixes: self.skip_prefixes,
            skip_suffixes: self.skip_suffixes,
        }
    }
}
