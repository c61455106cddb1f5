//! Pipeline and log-sink errors.
//!
//! Policy violations and detected attacks are not errors; stages answer
//! those with an envelope and stop. [`PipelineError`] covers the failures
//! that reach the outer boundary, and [`SinkError`] the failures of the
//! fire-and-forget log shipment, which never reach the client.

use bulwark_core::{CaptureError, EnvelopeError, ResponseCode};
use thiserror::Error;

/// A failure caught at the pipeline boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request body could not be captured.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// An envelope could not be serialized.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// A stage or the handler panicked.
    #[error("request processing panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Builds a [`PipelineError::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }

    /// Returns the catalog entry sent to the client.
    ///
    /// Details stay in the logs; the client only ever sees this code.
    #[must_use]
    pub const fn response_code(&self) -> ResponseCode {
        match self {
            Self::Envelope(err) => err.response_code(),
            Self::Capture(_) | Self::Panicked(_) => ResponseCode::InternalError,
        }
    }
}

/// A log record could not be delivered.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The HTTP request to the collector failed.
    #[cfg(feature = "http-sink")]
    #[error("log shipment failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("log collector rejected record with status {status}")]
    Rejected {
        /// HTTP status returned by the collector.
        status: u16,
    },

    /// The receiving end of a channel sink was dropped.
    #[error("log channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads() {
        let err = PipelineError::from_panic(&"boom");
        assert_eq!(err.to_string(), "request processing panicked: boom");

        let err = PipelineError::from_panic(&String::from("owned"));
        assert!(err.to_string().ends_with("owned"));

        let err = PipelineError::from_panic(&42_u32);
        assert!(err.to_string().contains("non-string"));
    }

    #[test]
    fn test_response_codes() {
        let capture = PipelineError::from(CaptureError::TooLarge { limit: 1 });
        assert_eq!(capture.response_code(), ResponseCode::InternalError);

        let json = serde_json::from_str::<u8>("x").unwrap_err();
        let envelope = PipelineError::from(EnvelopeError::from(json));
        assert_eq!(envelope.response_code(), ResponseCode::JsonProcessingError);
    }

    #[test]
    fn test_sink_error_display() {
        assert_eq!(
            SinkError::Rejected { status: 503 }.to_string(),
            "log collector rejected record with status 503"
        );
        assert_eq!(SinkError::ChannelClosed.to_string(), "log channel closed");
    }
}
