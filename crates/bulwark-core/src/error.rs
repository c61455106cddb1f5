//! Error types for the core building blocks.
//!
//! None of these errors describe a detected attack or a policy violation;
//! those are ordinary outcomes reported through [`ResponseCode`]. The types
//! here cover infrastructure failures that abort a request (a body that
//! cannot be drained, an envelope that cannot be serialized) and
//! configuration failures that abort startup (a signature that does not
//! compile).

use crate::code::ResponseCode;
use thiserror::Error;

/// A boxed error produced by an underlying HTTP body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to capture a request body.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The underlying body stream failed before it was fully read.
    #[error("failed to drain request body: {0}")]
    Drain(#[source] BoxError),

    /// The body exceeded the configured capture limit.
    #[error("request body exceeds capture limit of {limit} bytes")]
    TooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },
}

impl CaptureError {
    /// Wraps an underlying body error.
    pub fn drain(source: impl Into<BoxError>) -> Self {
        Self::Drain(source.into())
    }
}

/// Failure to turn an envelope into a response.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope or its body could not be serialized to JSON.
    #[error("failed to serialize response envelope: {0}")]
    JsonProcessing(#[from] serde_json::Error),

    /// The configured timestamp format has an unknown specifier.
    #[error("invalid timestamp format: {0:?}")]
    InvalidTimestampFormat(String),
}

impl EnvelopeError {
    /// Returns the catalog entry describing this failure.
    #[must_use]
    pub const fn response_code(&self) -> ResponseCode {
        match self {
            Self::JsonProcessing(_) => ResponseCode::JsonProcessingError,
            Self::InvalidTimestampFormat(_) => ResponseCode::InternalError,
        }
    }
}

/// Failure to compile a signature set.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A single signature is not a valid regular expression.
    #[error("signature #{index} ({signature:?}) is not a valid pattern: {source}")]
    InvalidSignature {
        /// Position of the signature in the deduplicated set.
        index: usize,
        /// The offending signature text.
        signature: String,
        /// The regex compiler error.
        #[source]
        source: regex::Error,
    },

    /// The joined alternation failed to compile (e.g. it exceeds size limits).
    #[error("failed to compile signature alternation: {0}")]
    Alternation(#[source] regex::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_display() {
        let err = CaptureError::TooLarge { limit: 16 };
        assert_eq!(
            err.to_string(),
            "request body exceeds capture limit of 16 bytes"
        );
    }

    #[test]
    fn test_drain_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = CaptureError::drain(io);
        assert!(err.to_string().contains("reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_envelope_error_maps_to_json_processing() {
        let serde_err = serde_json::from_str::<u8>("x").unwrap_err();
        let err = EnvelopeError::from(serde_err);
        assert_eq!(err.response_code(), ResponseCode::JsonProcessingError);
    }

    #[test]
    fn test_invalid_signature_display() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = PatternError::InvalidSignature {
            index: 2,
            signature: "(".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("signature #2"));
    }
}
