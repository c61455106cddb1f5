//! # Bulwark
//!
//! **Request-interception security pipeline for HTTP services**
//!
//! Bulwark sits in front of an application handler and runs every request
//! through a fixed, ordered set of stages:
//!
//! - **Trace ID** - propagate or generate a correlation id
//! - **CORS** - reject cross-origin requests outside the policy
//! - **Access logging** - request/response records with truncation and masking
//! - **XSS / SQL injection** - signature scans of parameters, cookies and body
//! - **Security headers** - hardening headers on handler responses
//!
//! Rejected requests get a JSON envelope with a stable result code and the
//! request's trace id.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulwark::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("bulwark.toml")?
//!         .with_env_prefix("BULWARK")
//!         .load()?;
//!
//!     init_telemetry(&config.telemetry)?;
//!     let pipeline = pipeline_from_config(&config)?;
//!
//!     // In the server's service function:
//!     // let response = pipeline.handle(request, Some(remote_addr), handler).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → TraceId → CORS → Logging → XSS → SQLi → SecurityHeaders → Handler
//!                                                                        ↓
//! Response ←──────────── (same stages, reverse order) ←──────────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/bulwark/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod build;
mod error;

pub use build::{
    build_pipeline, cors_registry, envelope_serializer, pipeline_from_config, sink_from_config,
};
pub use error::{BuildError, BuildResult};

// Re-export the component crates
pub use bulwark_config as config;
pub use bulwark_core as core;
pub use bulwark_middleware as middleware;
pub use bulwark_telemetry as telemetry;

pub use bulwark_config::{BulwarkConfig, ConfigError, ConfigLoader};
pub use bulwark_middleware::{LogSink, NullSink, Pipeline, TracingSink};
pub use bulwark_telemetry::init_telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use bulwark::prelude::*;
///
/// let config = BulwarkConfig::default();
/// assert_eq!(Stage::all().len(), 6);
/// assert!(config.validate().is_ok());
/// ```
pub mod prelude {
    pub use crate::{build_pipeline, pipeline_from_config, sink_from_config, BuildError};

    pub use bulwark_config::{BulwarkConfig, ConfigError, ConfigLoader};

    pub use bulwark_core::{
        CapturedBody, EnvelopeSerializer, FlushedResponse, ResponseCode, ResultCodeFormat, TraceId,
    };

    pub use bulwark_middleware::{
        BoxFuture, ChannelSink, LogSink, Middleware, MiddlewareContext, Next, NullSink, Pipeline,
        PipelineError, PipelineResult, Request, Response, ResponseExt, Stage, TracingSink,
    };

    pub use bulwark_telemetry::{init_telemetry, TelemetryConfig};
}
