//! # Bulwark Middleware
//!
//! The request-interception pipeline for Bulwark.
//!
//! Every request is captured once, then passes through an ordered set of
//! stages before the application handler. A stage either forwards the
//! request with [`Next::run`] or answers it with a response envelope and
//! stops the chain.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → TraceId → CORS → Logging → XSS → SQLi → SecurityHeaders → Handler
//!                                                                        ↓
//! Response ←──────────── (same stages, reverse order) ←──────────────────┘
//! ```
//!
//! | Precedence | Stage            | On violation                     |
//! |------------|------------------|----------------------------------|
//! | 0          | Trace ID         | -                                |
//! | 1          | CORS             | `403` `CORS_*_POLICY_VIOLATION`  |
//! | 2          | Logging          | -                                |
//! | 3          | XSS              | `403` `XSS_IN_*`                 |
//! | 4          | SQL Injection    | `400` `SQL_INJECTION_*_DETECTED` |
//! | 5          | Security Headers | -                                |
//!
//! ## Example
//!
//! ```
//! use bulwark_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 6);
//! assert_eq!(stages[0].name(), "trace_id");
//! assert_eq!(stages[5].name(), "security_headers");
//! ```

#![doc(html_root_url = "https://docs.rs/bulwark-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod cors;
pub mod error;
pub mod inspect;
pub mod middleware;
pub mod pipeline;
pub mod sink;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use context::MiddlewareContext;
pub use error::{PipelineError, SinkError};
pub use middleware::{BoxFuture, Middleware, Next, PipelineResult};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use sink::{ChannelSink, LogSink, NullSink, TracingSink};
pub use types::{Request, Response, ResponseExt};

#[cfg(feature = "http-sink")]
pub use sink::HttpSink;
