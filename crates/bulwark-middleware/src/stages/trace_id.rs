//! Trace ID middleware.
//!
//! Runs first so every later stage, log record, and envelope sees the final
//! correlation id.
//!
//! ## Trace ID Sources
//!
//! 1. **X-Trace-Id header**: used when trusted and well formed
//! 2. **Generated UUID v4**: otherwise
//!
//! The id is always echoed on the response, including responses produced by
//! later stages that answered the request themselves.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::pipeline::Stage;
use crate::types::Request;
use bulwark_core::TraceId;
use http::header::{HeaderName, InvalidHeaderName};
use http::HeaderValue;

/// The default header name for trace id propagation.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Middleware that propagates or generates the trace id.
///
/// # Example
///
/// ```
/// use bulwark_middleware::stages::TraceIdMiddleware;
///
/// let middleware = TraceIdMiddleware::new().trust_incoming(false);
/// assert_eq!(middleware.header().as_str(), "x-trace-id");
/// ```
#[derive(Debug, Clone)]
pub struct TraceIdMiddleware {
    header: HeaderName,
    trust_incoming: bool,
}

impl Default for TraceIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceIdMiddleware {
    /// Creates the middleware with the `X-Trace-Id` header, trusting
    /// incoming ids.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static(TRACE_ID_HEADER),
            trust_incoming: true,
        }
    }

    /// Uses a different header name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid header name.
    pub fn with_header(mut self, name: &str) -> Result<Self, InvalidHeaderName> {
        self.header = HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes())?;
        Ok(self)
    }

    /// Whether to accept ids supplied by the client.
    ///
    /// Deployments exposed directly to untrusted clients may want `false`.
    #[must_use]
    pub fn trust_incoming(mut self, trust: bool) -> Self {
        self.trust_incoming = trust;
        self
    }

    /// Returns the propagation header.
    #[must_use]
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    fn extract(&self, request: &Request) -> Option<TraceId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .and_then(TraceId::parse)
    }
}

impl Middleware for TraceIdMiddleware {
    fn name(&self) -> &'static str {
        Stage::TraceId.name()
    }

    fn precedence(&self) -> u8 {
        Stage::TraceId.precedence()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if let Some(trace_id) = self.extract(&request) {
                tracing::Span::current().record("trace_id", trace_id.as_str());
                ctx.set_trace_id(trace_id);
            }

            let mut response = next.run(ctx, request).await?;

            // TraceId only admits header-safe characters.
            if let Ok(value) = HeaderValue::from_str(ctx.trace_id().as_str()) {
                response.headers_mut().insert(self.header.clone(), value);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::CapturedBody;

    fn get(trace_id: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("/test");
        if let Some(id) = trace_id {
            builder = builder.header(TRACE_ID_HEADER, id);
        }
        builder.body(CapturedBody::empty()).unwrap()
    }

    fn echo_trace_id() -> impl FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> {
        |ctx, _req| {
            let seen = ctx.trace_id().to_string();
            Box::pin(async move { Ok(http::Response::new(CapturedBody::from(seen))) })
        }
    }

    #[tokio::test]
    async fn test_generates_trace_id_when_missing() {
        let middleware = TraceIdMiddleware::new();
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(&mut ctx, get(None), Next::handler(echo_trace_id()))
            .await
            .unwrap();

        let header = response.headers()[TRACE_ID_HEADER].to_str().unwrap();
        assert_eq!(header, ctx.trace_id().as_str());
        assert_eq!(response.body().text(), header);
    }

    #[tokio::test]
    async fn test_propagates_trusted_id() {
        let middleware = TraceIdMiddleware::new();
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(
                &mut ctx,
                get(Some("client-42")),
                Next::handler(echo_trace_id()),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[TRACE_ID_HEADER], "client-42");
        assert_eq!(response.body().text(), "client-42");
        assert_eq!(ctx.trace_id().as_str(), "client-42");
    }

    #[tokio::test]
    async fn test_ignores_untrusted_id() {
        let middleware = TraceIdMiddleware::new().trust_incoming(false);
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(
                &mut ctx,
                get(Some("client-42")),
                Next::handler(echo_trace_id()),
            )
            .await
            .unwrap();

        assert_ne!(response.headers()[TRACE_ID_HEADER], "client-42");
    }

    #[tokio::test]
    async fn test_ignores_malformed_id() {
        let middleware = TraceIdMiddleware::new();
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(
                &mut ctx,
                get(Some("bad id with spaces")),
                Next::handler(echo_trace_id()),
            )
            .await
            .unwrap();

        let header = response.headers()[TRACE_ID_HEADER].to_str().unwrap();
        assert_ne!(header, "bad id with spaces");
        assert!(uuid_like(header));
    }

    #[test]
    fn test_custom_header() {
        let middleware = TraceIdMiddleware::new().with_header("X-Correlation-Id").unwrap();
        assert_eq!(middleware.header().as_str(), "x-correlation-id");
        assert!(TraceIdMiddleware::new().with_header("bad header").is_err());
    }

    fn uuid_like(value: &str) -> bool {
        value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
    }
}
