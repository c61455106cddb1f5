//! Common types used throughout the middleware pipeline.

use bulwark_core::{
    CapturedRequest, CapturedResponse, EnvelopeError, EnvelopeSerializer, ResponseCode, TraceId,
};

/// The request type seen by every stage.
///
/// The body has already been drained once; every stage and the handler read
/// the same bytes.
pub type Request = CapturedRequest;

/// The response type produced by stages and handlers.
///
/// Nothing reaches the connection until the pipeline flushes it.
pub type Response = CapturedResponse;

/// Extension trait for building pipeline responses.
pub trait ResponseExt {
    /// Creates the error envelope for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the envelope cannot be serialized. Stages
    /// pass it up with `?`; the pipeline answers it with
    /// `JSON_PROCESSING_ERROR`.
    fn envelope(
        serializer: &EnvelopeSerializer,
        code: ResponseCode,
        trace_id: &TraceId,
    ) -> Result<Response, EnvelopeError>;
}

impl ResponseExt for Response {
    fn envelope(
        serializer: &EnvelopeSerializer,
        code: ResponseCode,
        trace_id: &TraceId,
    ) -> Result<Response, EnvelopeError> {
        serializer.error_response(code, trace_id)
    }
}
