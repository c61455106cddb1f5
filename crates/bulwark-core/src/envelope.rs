//! Response envelope.
//!
//! Every response the pipeline writes on its own (violations, detections,
//! internal failures) and every handler that opts in uses the same flat
//! JSON shape:
//!
//! ```json
//! {"resultCode":"XSS_IN_BODY","resultMessage":"XSS attack detected in request body","traceId":"..."}
//! ```
//!
//! Absent fields are omitted rather than written as `null`. A `timestamp`
//! string and a `body` are added when present.
//!
//! Serialization goes through an explicitly constructed [`EnvelopeSerializer`]
//! that is passed to whoever needs it; there is no process-wide serializer.

use crate::capture::{CapturedBody, CapturedResponse};
use crate::code::{ResponseCode, ResultCodeFormat};
use crate::error::EnvelopeError;
use crate::trace::TraceId;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use serde::Serialize;

/// Default timestamp format (RFC 3339 with milliseconds, UTC).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Content type of every envelope response.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/json";

/// The header part of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// The outcome.
    pub code: ResponseCode,
    /// Message override; the catalog message is used when `None`.
    pub message: Option<String>,
    /// Correlation id.
    pub trace_id: TraceId,
}

impl EnvelopeHeader {
    /// Returns the message that will be sent.
    #[must_use]
    pub fn result_message(&self) -> &str {
        self.message.as_deref().unwrap_or(self.code.message())
    }
}

/// A success or error payload with correlation id.
///
/// # Example
///
/// ```
/// use bulwark_core::{EnvelopeSerializer, ResponseCode, ResponseEnvelope, TraceId};
///
/// let serializer = EnvelopeSerializer::new();
/// let trace_id = TraceId::parse("t-1").unwrap();
///
/// let envelope = ResponseEnvelope::error(ResponseCode::XssInBody, Some(trace_id));
/// let json = serializer.to_json(&envelope).unwrap();
/// assert_eq!(
///     json,
///     r#"{"resultCode":"XSS_IN_BODY","resultMessage":"XSS attack detected in request body","traceId":"t-1"}"#
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ResponseEnvelope<T = ()> {
    header: EnvelopeHeader,
    body: Option<T>,
    issued_at: DateTime<Utc>,
}

/// An envelope without a body.
pub type ErrorEnvelope = ResponseEnvelope<()>;

impl<T> ResponseEnvelope<T> {
    /// Creates an envelope carrying `data`.
    ///
    /// A fresh trace id is generated when none is supplied.
    #[must_use]
    pub fn success(data: T, code: ResponseCode, trace_id: Option<TraceId>) -> Self {
        Self {
            header: EnvelopeHeader {
                code,
                message: None,
                trace_id: trace_id.unwrap_or_else(TraceId::generate),
            },
            body: Some(data),
            issued_at: Utc::now(),
        }
    }

    /// Overrides the catalog message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.header.message = Some(message.into());
        self
    }

    /// Returns the header.
    #[must_use]
    pub fn header(&self) -> &EnvelopeHeader {
        &self.header
    }

    /// Returns the body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Returns the response code.
    #[must_use]
    pub fn code(&self) -> ResponseCode {
        self.header.code
    }

    /// Returns the trace id.
    #[must_use]
    pub fn trace_id(&self) -> &TraceId {
        &self.header.trace_id
    }

    /// Returns when the envelope was created.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl ResponseEnvelope<()> {
    /// Creates an envelope without a body.
    ///
    /// A fresh trace id is generated when none is supplied.
    #[must_use]
    pub fn error(code: ResponseCode, trace_id: Option<TraceId>) -> Self {
        Self {
            header: EnvelopeHeader {
                code,
                message: None,
                trace_id: trace_id.unwrap_or_else(TraceId::generate),
            },
            body: None,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Wire<'a, T> {
    result_code: &'a str,
    result_message: &'a str,
    trace_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a T>,
}

/// Renders envelopes to JSON and HTTP responses.
///
/// Construct one at startup and share it; it is immutable once built.
#[derive(Debug, Clone)]
pub struct EnvelopeSerializer {
    code_format: ResultCodeFormat,
    include_timestamp: bool,
    timestamp_format: String,
    pretty: bool,
}

impl Default for EnvelopeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeSerializer {
    /// Creates a serializer with symbolic codes, no timestamp, compact output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_format: ResultCodeFormat::Symbolic,
            include_timestamp: false,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            pretty: false,
        }
    }

    /// Selects symbolic or numeric result codes.
    #[must_use]
    pub fn with_code_format(mut self, format: ResultCodeFormat) -> Self {
        self.code_format = format;
        self
    }

    /// Adds a formatted `timestamp` field to every envelope.
    #[must_use]
    pub fn with_timestamp(mut self, include: bool) -> Self {
        self.include_timestamp = include;
        self
    }

    /// Sets the `strftime`-style timestamp format.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidTimestampFormat`] if the format
    /// contains an unknown specifier.
    pub fn with_timestamp_format(mut self, format: &str) -> Result<Self, EnvelopeError> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(EnvelopeError::InvalidTimestampFormat(format.to_string()));
        }
        self.timestamp_format = format.to_string();
        Ok(self)
    }

    /// Enables pretty-printed output.
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Returns the configured code format.
    #[must_use]
    pub fn code_format(&self) -> ResultCodeFormat {
        self.code_format
    }

    /// Serializes an envelope to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::JsonProcessing`] if the body cannot be
    /// serialized.
    pub fn to_json<T: Serialize>(
        &self,
        envelope: &ResponseEnvelope<T>,
    ) -> Result<String, EnvelopeError> {
        let header = &envelope.header;
        let wire = Wire {
            result_code: header.code.render(self.code_format),
            result_message: header.result_message(),
            trace_id: header.trace_id.as_str(),
            timestamp: self
                .include_timestamp
                .then(|| envelope.issued_at.format(&self.timestamp_format).to_string()),
            body: envelope.body.as_ref(),
        };

        let json = if self.pretty {
            serde_json::to_string_pretty(&wire)?
        } else {
            serde_json::to_string(&wire)?
        };
        Ok(json)
    }

    /// Serializes an envelope into a buffered response.
    ///
    /// The status comes from the envelope's code.
    ///
    /// # Errors
    ///
    /// Same as [`to_json`](Self::to_json).
    pub fn to_response<T: Serialize>(
        &self,
        envelope: &ResponseEnvelope<T>,
    ) -> Result<CapturedResponse, EnvelopeError> {
        let json = self.to_json(envelope)?;
        let mut response = http::Response::new(CapturedBody::from(json));
        *response.status_mut() = envelope.code().status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(ENVELOPE_CONTENT_TYPE));
        Ok(response)
    }

    /// Shorthand for an error envelope response.
    ///
    /// # Errors
    ///
    /// Same as [`to_json`](Self::to_json).
    pub fn error_response(
        &self,
        code: ResponseCode,
        trace_id: &TraceId,
    ) -> Result<CapturedResponse, EnvelopeError> {
        self.to_response(&ResponseEnvelope::error(code, Some(trace_id.clone())))
    }

    /// Builds the generic internal-error response without going through
    /// serde.
    ///
    /// Used when serialization itself has failed, so it cannot fail.
    #[must_use]
    pub fn fallback_response(&self, trace_id: &TraceId) -> CapturedResponse {
        let code = ResponseCode::InternalError;
        let json = format!(
            r#"{{"resultCode":"{}","resultMessage":"{}","traceId":"{}"}}"#,
            code.render(self.code_format),
            code.message(),
            trace_id
        );
        let mut response = http::Response::new(CapturedBody::from(json));
        *response.status_mut() = code.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(ENVELOPE_CONTENT_TYPE));
        response
    }
}
