//! # Bulwark Core
//!
//! Core types for the Bulwark request-interception pipeline.
//!
//! This crate holds the pieces every pipeline stage builds on:
//!
//! - [`capture`] - Buffered request/response bodies that can be read repeatedly
//! - [`pattern`] - Signature sets compiled into a single case-insensitive matcher
//! - [`signatures`] - Built-in XSS and SQL injection catalogs
//! - [`request`] - Parameter and cookie accessors used by the inspectors
//! - [`envelope`] - The JSON response envelope and its serializer
//! - [`ResponseCode`] - The fixed catalog of outcomes
//! - [`TraceId`] - Per-request correlation id
//!
//! Nothing here knows about stage ordering; that lives in
//! `bulwark-middleware`.

#![doc(html_root_url = "https://docs.rs/bulwark-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod capture;
pub mod code;
pub mod envelope;
mod error;
pub mod pattern;
pub mod request;
pub mod signatures;
mod trace;

pub use capture::{
    BodyCapture, CaptureLimits, CapturedBody, CapturedRequest, CapturedResponse, FlushedResponse,
    ResponseBuffer,
};
pub use code::{ResponseCode, ResultCodeFormat};
pub use envelope::{EnvelopeSerializer, ErrorEnvelope, ResponseEnvelope};
pub use error::{BoxError, CaptureError, EnvelopeError, PatternError};
pub use pattern::{
    CompiledMatcher, DetectionResult, DetectionSource, EmptySignaturePolicy, SignatureSet,
};
pub use trace::{TraceId, MAX_TRACE_ID_LEN};
