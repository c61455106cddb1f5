//! CORS middleware.
//!
//! Enforces the [`CorsRegistry`] for cross-origin requests:
//!
//! 1. Same-origin requests and requests without `Origin` pass through
//! 2. Paths without a registered policy pass through
//! 3. A violation answers with the 403 envelope; nothing later runs
//! 4. An allowed preflight is answered here with `204 No Content`
//! 5. An allowed actual request continues and gets `Access-Control-*`
//!    headers on its response

use crate::context::MiddlewareContext;
use crate::cors::{headers, is_cross_origin, is_preflight, CorsDecision, CorsPolicy, CorsRegistry, WILDCARD};
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::pipeline::Stage;
use crate::types::{Request, Response, ResponseExt};
use bulwark_core::{CapturedBody, EnvelopeSerializer};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;

/// CORS policy enforcement stage.
///
/// # Example
///
/// ```
/// use bulwark_middleware::cors::{CorsPolicy, CorsRegistry};
/// use bulwark_middleware::stages::CorsMiddleware;
///
/// let policy = CorsPolicy::builder()
///     .allow_origins(["https://app.example.com"])
///     .allow_methods(["GET", "POST"])
///     .build();
/// let cors = CorsMiddleware::new(CorsRegistry::global(policy));
/// # let _ = cors;
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    registry: CorsRegistry,
    serializer: Arc<EnvelopeSerializer>,
}

impl CorsMiddleware {
    /// Creates the stage with the default serializer.
    #[must_use]
    pub fn new(registry: CorsRegistry) -> Self {
        Self::with_serializer(registry, Arc::default())
    }

    /// Creates the stage with a shared serializer.
    #[must_use]
    pub fn with_serializer(registry: CorsRegistry, serializer: Arc<EnvelopeSerializer>) -> Self {
        Self {
            registry,
            serializer,
        }
    }

    /// A stage that allows every origin on every path.
    #[must_use]
    pub fn permissive() -> Self {
        Self::new(CorsRegistry::global(CorsPolicy::permissive()))
    }

    /// Returns the policy registry.
    #[must_use]
    pub fn registry(&self) -> &CorsRegistry {
        &self.registry
    }
}

fn origin_of(request: &Request) -> Option<String> {
    request
        .headers()
        .get(headers::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The value for `Access-Control-Allow-Origin`.
///
/// `*` is only sent for wildcard origins without credentials; browsers
/// reject `*` together with credentials.
fn allow_origin_value(policy: &CorsPolicy, origin: &str) -> Option<HeaderValue> {
    let wildcard = policy.allowed_origins().any(|o| o == WILDCARD);
    if wildcard && !policy.allow_credentials() {
        return Some(HeaderValue::from_static(WILDCARD));
    }
    HeaderValue::from_str(origin).ok()
}

fn append_vary(headers: &mut HeaderMap, value: &'static str) {
    headers.append(headers::VARY, HeaderValue::from_static(value));
}

fn join(values: impl Iterator<Item = impl AsRef<str>>) -> Option<HeaderValue> {
    let joined = values
        .map(|v| v.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        return None;
    }
    HeaderValue::from_str(&joined).ok()
}

fn preflight_response(policy: &CorsPolicy, request: &Request, origin: &str) -> Response {
    let mut response = http::Response::new(CapturedBody::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let out = response.headers_mut();

    if let Some(value) = allow_origin_value(policy, origin) {
        out.insert(headers::ALLOW_ORIGIN, value);
    }

    // Wildcard lists echo what was asked for.
    let requested_method = request.headers().get(headers::REQUEST_METHOD).cloned();
    let methods = if policy.allowed_methods().any(|m| m == WILDCARD) {
        requested_method
    } else {
        join(policy.allowed_methods())
    };
    if let Some(value) = methods {
        out.insert(headers::ALLOW_METHODS, value);
    }

    let requested_headers = request.headers().get(headers::REQUEST_HEADERS).cloned();
    let allowed_headers = if policy.allowed_headers().any(|h| h == WILDCARD) {
        requested_headers
    } else {
        join(policy.allowed_headers())
    };
    if let Some(value) = allowed_headers {
        out.insert(headers::ALLOW_HEADERS, value);
    }

    if policy.allow_credentials() {
        out.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    if let Some(max_age) = policy.max_age() {
        out.insert(headers::MAX_AGE, HeaderValue::from(max_age.as_secs()));
    }

    append_vary(out, "Origin, Access-Control-Request-Method, Access-Control-Request-Headers");
    response
}

fn decorate(policy: &CorsPolicy, response: &mut Response, origin: &str) {
    let out = response.headers_mut();

    if let Some(value) = allow_origin_value(policy, origin) {
        out.insert(headers::ALLOW_ORIGIN, value);
    }
    if policy.allow_credentials() {
        out.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
    if let Some(value) = join(policy.exposed_headers()) {
        out.insert(headers::EXPOSE_HEADERS, value);
    }
    append_vary(out, "Origin");
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        Stage::Cors.name()
    }

    fn precedence(&self) -> u8 {
        Stage::Cors.precedence()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if !is_cross_origin(&request) {
                return next.run(ctx, request).await;
            }

            let Some(policy) = self.registry.policy_for(request.uri().path()) else {
                tracing::debug!(path = %request.uri().path(), "no CORS policy bound to path");
                return next.run(ctx, request).await;
            };

            let origin = origin_of(&request).unwrap_or_default();
            match policy.evaluate(&request) {
                CorsDecision::Deny(code) => {
                    tracing::error!(
                        origin = %origin,
                        method = %request.method(),
                        code = code.name(),
                        "CORS policy violation"
                    );
                    ctx.block(code);
                    bulwark_telemetry::metrics::record_blocked(Stage::Cors.name(), code.name());
                    Ok(Response::envelope(&self.serializer, code, ctx.trace_id())?)
                }
                decision => {
                    tracing::debug!(origin = %origin, ?decision, "CORS request allowed");
                    if is_preflight(&request) {
                        return Ok(preflight_response(policy, &request, &origin));
                    }
                    let mut response = next.run(ctx, request).await?;
                    decorate(policy, &mut response, &origin);
                    Ok(response)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn strict() -> CorsMiddleware {
        CorsMiddleware::new(CorsRegistry::global(
            CorsPolicy::builder()
                .allow_origins(["http://good.com"])
                .allow_methods(["GET", "POST"])
                .allow_headers(["origin", "host", "content-type"])
                .expose_headers(["X-Trace-Id"])
                .allow_credentials(true)
                .max_age(Duration::from_secs(600))
                .build(),
        ))
    }

    fn get(origin: &str) -> Request {
        http::Request::builder()
            .uri("/api/data")
            .header("host", "api.good.com")
            .header("origin", origin)
            .body(CapturedBody::empty())
            .unwrap()
    }

    fn preflight(origin: &str, method: &str, request_headers: &str) -> Request {
        http::Request::builder()
            .method("OPTIONS")
            .uri("/api/data")
            .header("host", "api.good.com")
            .header("origin", origin)
            .header(headers::REQUEST_METHOD, method)
            .header(headers::REQUEST_HEADERS, request_headers)
            .body(CapturedBody::empty())
            .unwrap()
    }

    fn counting_handler(
        hits: Arc<AtomicUsize>,
    ) -> impl FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> {
        move |_ctx, _req| {
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(http::Response::new(CapturedBody::from("OK")))
            })
        }
    }

    async fn run(middleware: &CorsMiddleware, request: Request) -> (Response, usize, MiddlewareContext) {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut ctx = MiddlewareContext::new();
        let response = middleware
            .process(&mut ctx, request, Next::handler(counting_handler(hits.clone())))
            .await
            .unwrap();
        (response, hits.load(Ordering::SeqCst), ctx)
    }

    #[tokio::test]
    async fn test_disallowed_origin_is_rejected_with_envelope() {
        let (response, hits, ctx) = run(&strict(), get("http://evil.com")).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(hits, 0);
        assert_eq!(ctx.blocked_by(), Some(bulwark_core::ResponseCode::CorsOriginPolicyViolation));

        let value: serde_json::Value = serde_json::from_slice(response.body().as_bytes()).unwrap();
        assert_eq!(value["resultCode"], "CORS_ORIGIN_POLICY_VIOLATION");
        assert_eq!(value["traceId"], ctx.trace_id().as_str());
        assert!(!response.headers().contains_key(headers::ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_allowed_origin_gets_cors_headers() {
        let (response, hits, _) = run(&strict(), get("http://good.com")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hits, 1);
        assert_eq!(response.headers()[headers::ALLOW_ORIGIN], "http://good.com");
        assert_eq!(response.headers()[headers::ALLOW_CREDENTIALS], "true");
        assert_eq!(response.headers()[headers::EXPOSE_HEADERS], "x-trace-id");
        assert_eq!(response.headers()[headers::VARY], "Origin");
    }

    #[tokio::test]
    async fn test_same_origin_passes_untouched() {
        let (response, hits, _) = run(&strict(), get("http://api.good.com")).await;
        assert_eq!(hits, 1);
        assert!(!response.headers().contains_key(headers::ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_unbound_path_passes() {
        let middleware = CorsMiddleware::new(
            CorsRegistry::new().register("/admin/**", strict().registry().policy_for("/").unwrap().clone()),
        );
        let (response, hits, _) = run(&middleware, get("http://evil.com")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn test_preflight_is_answered_without_handler() {
        let (response, hits, _) = run(
            &strict(),
            preflight("http://good.com", "POST", "content-type"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(hits, 0);
        assert_eq!(response.headers()[headers::ALLOW_METHODS], "GET, POST");
        assert_eq!(response.headers()[headers::ALLOW_HEADERS], "origin, host, content-type");
        assert_eq!(response.headers()[headers::MAX_AGE], "600");
    }

    #[tokio::test]
    async fn test_preflight_with_forbidden_method() {
        let (response, hits, ctx) = run(
            &strict(),
            preflight("http://good.com", "DELETE", "content-type"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(hits, 0);
        assert_eq!(ctx.blocked_by(), Some(bulwark_core::ResponseCode::CorsMethodPolicyViolation));
    }

    #[tokio::test]
    async fn test_permissive_echoes_preflight_request() {
        let (response, _, _) = run(
            &CorsMiddleware::permissive(),
            preflight("http://any.where", "PATCH", "x-custom"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[headers::ALLOW_ORIGIN], "http://any.where");
        assert_eq!(response.headers()[headers::ALLOW_METHODS], "PATCH");
        assert_eq!(response.headers()[headers::ALLOW_HEADERS], "x-custom");
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(strict().name(), "cors");
        assert_eq!(strict().precedence(), 1);
    }
}
