//! Built-in pipeline stages.
//!
//! Listed in execution order:
//!
//! 0. [`trace_id`] - Propagate or generate the correlation id
//! 1. [`cors`] - Enforce the CORS policy registry
//! 2. [`logging`] - Ship request and response access-log records
//! 3. [`xss`] - Reject cross-site scripting signatures
//! 4. [`sql_injection`] - Reject SQL injection signatures
//! 5. [`security_headers`] - Set hardening headers on responses

pub mod cors;
pub mod logging;
pub mod security_headers;
pub mod sql_injection;
pub mod trace_id;
pub mod xss;

// Re-export main types
pub use cors::CorsMiddleware;
pub use logging::{BodyRedactor, LogRecord, LoggingMiddleware};
pub use security_headers::{SecurityHeaders, SecurityHeadersMiddleware};
pub use sql_injection::SqlInjectionMiddleware;
pub use trace_id::{TraceIdMiddleware, TRACE_ID_HEADER};
pub use xss::XssMiddleware;
