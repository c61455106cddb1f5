//! Ordered stage pipeline.
//!
//! Stages run in a strict precedence order, lowest first:
//!
//! 0. **Trace ID** - Propagate or generate the correlation id
//! 1. **CORS** - Reject cross-origin requests outside the policy
//! 2. **Logging** - Snapshot request and response for the access log
//! 3. **XSS** - Scan parameters, cookies, and body for script injection
//! 4. **SQL Injection** - Scan parameters, cookies, and body for SQL injection
//! 5. **Security Headers** - Set hardening headers on every response
//!
//! Stages may be registered in any order; [`PipelineBuilder::build`] sorts
//! them by [`Middleware::precedence`]. Stages with equal precedence keep
//! their registration order.
//!
//! [`Pipeline::handle`] is the outer boundary: it captures the body once,
//! runs the chain inside a request span, answers errors and panics with the
//! envelope for [`PipelineError::response_code`], and flushes the response
//! exactly once.

use crate::context::MiddlewareContext;
use crate::error::PipelineError;
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::types::{Request, Response, ResponseExt};
use bulwark_core::capture::{capture_request, flush};
use bulwark_core::{BoxError, CaptureLimits, EnvelopeSerializer, FlushedResponse};
use futures_util::FutureExt;
use http_body::Body;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The composed stage pipeline.
///
/// Immutable once built and safe to share across concurrent requests.
///
/// # Example
///
/// ```
/// use bulwark_core::CapturedBody;
/// use bulwark_middleware::pipeline::Pipeline;
/// use bulwark_middleware::stages::SecurityHeadersMiddleware;
/// use http_body_util::Full;
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .stage(SecurityHeadersMiddleware::default())
///     .build();
///
/// let request = http::Request::get("/").body(Full::new(Bytes::new())).unwrap();
/// let response = pipeline
///     .handle(request, None, |_ctx, _req| {
///         Box::pin(async { Ok(http::Response::new(CapturedBody::from("hello"))) })
///     })
///     .await;
///
/// assert_eq!(response.headers()["x-frame-options"], "DENY");
/// # });
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
    serializer: Arc<EnvelopeSerializer>,
    capture_limits: CaptureLimits,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("capture_limits", &self.capture_limits)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs an already captured request through every stage and the handler.
    ///
    /// No panic catching and no flush happen here; see [`handle`](Self::handle).
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a stage or the handler.
    pub async fn process<H>(
        &self,
        mut ctx: MiddlewareContext,
        request: Request,
        handler: H,
    ) -> PipelineResult
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> + Send + 'static,
    {
        self.build_chain(handler).run(&mut ctx, request).await
    }

    /// Handles a raw request end to end.
    ///
    /// Failures never escape. An envelope that cannot be serialized becomes
    /// `JSON_PROCESSING_ERROR`; a body that cannot be drained or a panic in
    /// any stage or the handler becomes `INTERNAL_ERROR`. Both carry the
    /// request's trace id. If even that envelope cannot be serialized, a
    /// fixed internal-error body is sent.
    pub async fn handle<B, H>(
        &self,
        request: http::Request<B>,
        remote_addr: Option<SocketAddr>,
        handler: H,
    ) -> FlushedResponse
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<BoxError>,
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> + Send + 'static,
    {
        let mut ctx = MiddlewareContext::new().with_remote_addr(remote_addr);
        let span = tracing::info_span!(
            "request",
            trace_id = %ctx.trace_id(),
            method = %request.method(),
            path = %request.uri().path(),
        );

        async move {
            let response = match self.dispatch(&mut ctx, request, handler).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(error = %err, "request failed at pipeline boundary");
                    Response::envelope(&self.serializer, err.response_code(), ctx.trace_id())
                        .unwrap_or_else(|err| {
                            tracing::error!(error = %err, "boundary envelope could not be serialized");
                            self.serializer.fallback_response(ctx.trace_id())
                        })
                }
            };

            bulwark_telemetry::metrics::record_request(response.status().as_u16(), ctx.elapsed());
            tracing::debug!(
                status = response.status().as_u16(),
                elapsed_ms = ctx.elapsed().as_secs_f64() * 1000.0,
                "request completed"
            );
            flush(response)
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B, H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: http::Request<B>,
        handler: H,
    ) -> PipelineResult
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<BoxError>,
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> + Send + 'static,
    {
        let request = capture_request(request, self.capture_limits).await?;
        let chain = self.build_chain(handler);
        AssertUnwindSafe(chain.run(ctx, request))
            .catch_unwind()
            .await
            .map_err(|payload| PipelineError::from_panic(&*payload))?
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the serializer used for boundary envelopes.
    #[must_use]
    pub fn serializer(&self) -> &Arc<EnvelopeSerializer> {
        &self.serializer
    }

    /// Returns the names of all stages in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
    serializer: Option<Arc<EnvelopeSerializer>>,
    capture_limits: CaptureLimits,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            serializer: None,
            capture_limits: CaptureLimits::unlimited(),
        }
    }

    /// Adds a stage. Registration order only matters between stages of equal
    /// precedence.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Adds a shared stage.
    #[must_use]
    pub fn boxed_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Sets the serializer used for boundary envelopes.
    ///
    /// Defaults to [`EnvelopeSerializer::new`].
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<EnvelopeSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Limits how many body bytes are captured per request.
    #[must_use]
    pub fn capture_limits(mut self, limits: CaptureLimits) -> Self {
        self.capture_limits = limits;
        self
    }

    /// Builds the pipeline, ordering stages by precedence.
    #[must_use]
    pub fn build(mut self) -> Pipeline {
        self.stages.sort_by_key(|mw| mw.precedence());
        Pipeline {
            stages: self.stages,
            serializer: self.serializer.unwrap_or_default(),
            capture_limits: self.capture_limits,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in stage precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 0: trace id propagation
    TraceId = 0,
    /// Stage 1: CORS policy
    Cors = 1,
    /// Stage 2: access logging
    Logging = 2,
    /// Stage 3: XSS inspection
    Xss = 3,
    /// Stage 4: SQL injection inspection
    SqlInjection = 4,
    /// Stage 5: security header injection
    SecurityHeaders = 5,
}

impl Stage {
    /// Returns the precedence value.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        self as u8
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TraceId => "trace_id",
            Self::Cors => "cors",
            Self::Logging => "logging",
            Self::Xss => "xss",
            Self::SqlInjection => "sql_injection",
            Self::SecurityHeaders => "security_headers",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 6] {
        [
            Self::TraceId,
            Self::Cors,
            Self::Logging,
            Self::Xss,
            Self::SqlInjection,
            Self::SecurityHeaders,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::{CapturedBody, ResponseCode, ResponseEnvelope, ResultCodeFormat};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full, StreamBody};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A test middleware that records its invocation order.
    struct OrderTrackingMiddleware {
        name: &'static str,
        precedence: u8,
        counter: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn precedence(&self) -> u8 {
            self.precedence
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, PipelineResult> {
            Box::pin(async move {
                self.counter.fetch_add(1, Ordering::SeqCst);
                self.order.lock().unwrap().push(self.name);
                next.run(ctx, request).await
            })
        }
    }

    struct Panicking;

    impl Middleware for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut MiddlewareContext,
            _request: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, PipelineResult> {
            Box::pin(async { Ok(explode()) })
        }
    }

    fn explode() -> Response {
        panic!("stage exploded")
    }

    /// A payload whose serialization always fails.
    struct Opaque;

    impl serde::Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque payload"))
        }
    }

    fn opaque_handler(
        serializer: Arc<EnvelopeSerializer>,
    ) -> impl FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> {
        move |ctx, _req| {
            let envelope = ResponseEnvelope::success(Opaque, ResponseCode::Success, Some(ctx.trace_id().clone()));
            Box::pin(async move { serializer.to_response(&envelope).map_err(PipelineError::from) })
        }
    }

    async fn body_json(response: FlushedResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn tracker(
        name: &'static str,
        precedence: u8,
        counter: &Arc<AtomicUsize>,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> OrderTrackingMiddleware {
        OrderTrackingMiddleware {
            name,
            precedence,
            counter: counter.clone(),
            order: order.clone(),
        }
    }

    fn echo_handler(
        hits: Arc<AtomicUsize>,
    ) -> impl FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> {
        move |_ctx, req| {
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(http::Response::new(req.into_body()))
            })
        }
    }

    fn raw_request(body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::post("/echo")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_stages_sorted_by_precedence() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let pipeline = Pipeline::builder()
            .stage(tracker("headers", Stage::SecurityHeaders.precedence(), &counter, &order))
            .stage(tracker("custom", u8::MAX, &counter, &order))
            .stage(tracker("cors", Stage::Cors.precedence(), &counter, &order))
            .stage(tracker("xss", Stage::Xss.precedence(), &counter, &order))
            .build();

        assert_eq!(pipeline.stage_names(), vec!["cors", "xss", "headers", "custom"]);

        let hits = Arc::new(AtomicUsize::new(0));
        let request = http::Request::get("/").body(CapturedBody::empty()).unwrap();
        let response = pipeline
            .process(MiddlewareContext::new(), request, echo_handler(hits.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec!["cors", "xss", "headers", "custom"]);
    }

    #[tokio::test]
    async fn test_equal_precedence_keeps_registration_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let pipeline = Pipeline::builder()
            .stage(tracker("b", 7, &counter, &order))
            .stage(tracker("a", 7, &counter, &order))
            .build();

        assert_eq!(pipeline.stage_names(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_reaches_handler() {
        let pipeline = Pipeline::builder().build();
        assert_eq!(pipeline.stage_count(), 0);

        let hits = Arc::new(AtomicUsize::new(0));
        let response = pipeline
            .handle(raw_request("payload"), None, echo_handler(hits.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(response.headers()[http::header::CONTENT_LENGTH], "7");
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error_envelope() {
        let pipeline = Pipeline::builder().stage(Panicking).build();
        let hits = Arc::new(AtomicUsize::new(0));

        let response = pipeline
            .handle(raw_request(""), None, echo_handler(hits.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let value = body_json(response).await;
        assert_eq!(value["resultCode"], "INTERNAL_ERROR");
        assert!(!value["traceId"].as_str().unwrap().is_empty());
        assert!(!value.to_string().contains("exploded"));
    }

    #[tokio::test]
    async fn test_unserializable_body_becomes_json_processing_error() {
        let pipeline = Pipeline::builder()
            .stage(OrderTrackingMiddleware {
                name: "outer",
                precedence: 0,
                counter: Arc::new(AtomicUsize::new(0)),
                order: Arc::new(Mutex::new(Vec::new())),
            })
            .build();
        let serializer = pipeline.serializer().clone();

        let response = pipeline
            .handle(raw_request(""), None, opaque_handler(serializer))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value = body_json(response).await;
        assert_eq!(value["resultCode"], "JSON_PROCESSING_ERROR");
        assert!(!value["traceId"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_processing_error_uses_numeric_codes() {
        let serializer =
            Arc::new(EnvelopeSerializer::new().with_code_format(ResultCodeFormat::Numeric));
        let pipeline = Pipeline::builder().serializer(serializer.clone()).build();

        let response = pipeline
            .handle(raw_request(""), None, opaque_handler(serializer))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["resultCode"], "4001");
    }

    #[tokio::test]
    async fn test_drain_failure_aborts_chain() {
        let pipeline = Pipeline::builder().build();
        let hits = Arc::new(AtomicUsize::new(0));

        let chunks: Vec<Result<http_body::Frame<Bytes>, std::io::Error>> = vec![
            Ok(http_body::Frame::data(Bytes::from_static(b"partial"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = StreamBody::new(futures_util::stream::iter(chunks));
        let request = http::Request::post("/upload").body(body).unwrap();

        let response = pipeline
            .handle(request, None, echo_handler(hits.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_limit_enforced() {
        let pipeline = Pipeline::builder()
            .capture_limits(CaptureLimits::with_max_body_bytes(4))
            .build();
        let hits = Arc::new(AtomicUsize::new(0));

        let response = pipeline
            .handle(raw_request("too long"), None, echo_handler(hits.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stage_ordering() {
        let all = Stage::all();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Stage::TraceId.precedence(), 0);
        assert_eq!(Stage::SecurityHeaders.precedence(), 5);
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<_> = Stage::all().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            ["trace_id", "cors", "logging", "xss", "sql_injection", "security_headers"]
        );
    }
}
