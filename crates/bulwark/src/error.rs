//! Errors raised while assembling a pipeline from configuration.

use bulwark_config::ConfigError;
use bulwark_core::{EnvelopeError, PatternError};
use bulwark_middleware::SinkError;
use http::header::{InvalidHeaderName, InvalidHeaderValue};
use thiserror::Error;

/// A pipeline could not be built from its configuration.
///
/// These are startup failures; once built, a pipeline never returns them.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A signature set did not compile.
    #[error("{filter} signatures: {source}")]
    Pattern {
        /// Filter the signatures belong to.
        filter: &'static str,
        /// Underlying compile error.
        #[source]
        source: PatternError,
    },

    /// The envelope timestamp format is invalid.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The log sink could not be created.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A security header value is not a valid header value.
    #[error("invalid security header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),

    /// The trace header is not a valid header name.
    #[error("invalid trace header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),
}

/// Result type for pipeline assembly.
pub type BuildResult<T> = Result<T, BuildError>;
