//! End-to-end tests running raw requests through the full stage set.

use bulwark_core::signatures::{default_sql_injection_signatures, default_xss_signatures};
use bulwark_core::{CapturedBody, EmptySignaturePolicy, EnvelopeSerializer};
use bulwark_middleware::cors::{CorsPolicy, CorsRegistry};
use bulwark_middleware::sink::ChannelSink;
use bulwark_middleware::stages::{
    BodyRedactor, CorsMiddleware, LoggingMiddleware, SecurityHeadersMiddleware,
    SqlInjectionMiddleware, TraceIdMiddleware, XssMiddleware,
};
use bulwark_middleware::{BoxFuture, MiddlewareContext, Pipeline, PipelineResult, Request};
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    pipeline: Pipeline,
    records: mpsc::Receiver<String>,
    hits: Arc<AtomicUsize>,
}

fn harness(redactor: BodyRedactor) -> Harness {
    let serializer = Arc::new(EnvelopeSerializer::new());
    let (sink, records) = ChannelSink::new(64);

    let cors = CorsPolicy::builder()
        .allow_origins(["http://good.com"])
        .allow_methods(["GET", "POST"])
        .allow_headers(["origin", "host", "content-type"])
        .allow_credentials(true)
        .build();

    let xss = default_xss_signatures()
        .compile(EmptySignaturePolicy::FailOpen)
        .unwrap();
    let sqli = default_sql_injection_signatures()
        .compile(EmptySignaturePolicy::FailOpen)
        .unwrap();

    // Registered out of order on purpose.
    let pipeline = Pipeline::builder()
        .serializer(serializer.clone())
        .stage(SecurityHeadersMiddleware::default())
        .stage(SqlInjectionMiddleware::with_serializer(sqli, serializer.clone()))
        .stage(XssMiddleware::with_serializer(xss, serializer.clone()))
        .stage(
            LoggingMiddleware::builder(Arc::new(sink))
                .redactor(redactor)
                .build(),
        )
        .stage(CorsMiddleware::with_serializer(
            CorsRegistry::new().register("/api/**", cors),
            serializer,
        ))
        .stage(TraceIdMiddleware::new())
        .build();

    Harness {
        pipeline,
        records,
        hits: Arc::new(AtomicUsize::new(0)),
    }
}

fn spy(hits: Arc<AtomicUsize>) -> impl FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> {
    move |_ctx, _req| {
        Box::pin(async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(http::Response::new(CapturedBody::from(r#"{"ok":true}"#)))
        })
    }
}

async fn send(h: &Harness, request: http::Request<Full<Bytes>>) -> (StatusCode, http::HeaderMap, String) {
    let response = h.pipeline.handle(request, None, spy(h.hits.clone())).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

async fn next_record(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
    let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("record not shipped")
        .expect("sink closed");
    serde_json::from_str(&raw).unwrap()
}

fn get(uri: &str) -> http::request::Builder {
    http::Request::get(uri).header("host", "api.local")
}

#[tokio::test]
async fn cross_origin_violation_never_reaches_handler() {
    let h = harness(BodyRedactor::default());
    let request = get("/api/data")
        .header("origin", "http://evil.com")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let (status, headers, body) = send(&h, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.hits.load(Ordering::SeqCst), 0);

    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["resultCode"], "CORS_ORIGIN_POLICY_VIOLATION");
    assert_eq!(value["traceId"], headers["x-trace-id"].to_str().unwrap());
    assert!(!headers.contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn allowed_origin_is_decorated() {
    let h = harness(BodyRedactor::default());
    let request = get("/api/data")
        .header("origin", "http://good.com")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let (status, headers, _) = send(&h, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.hits.load(Ordering::SeqCst), 1);
    assert_eq!(headers["access-control-allow-origin"], "http://good.com");
}

#[tokio::test]
async fn sql_injection_is_rejected_from_every_source() {
    let cases = [
        (
            get("/users?id=1%27%20OR%20%271%27%3D%271").body(Full::new(Bytes::new())),
            "SQL_INJECTION_PARAMETER_DETECTED",
        ),
        (
            get("/users")
                .header("cookie", "id=' OR '1'='1")
                .body(Full::new(Bytes::new())),
            "SQL_INJECTION_COOKIE_DETECTED",
        ),
        (
            http::Request::post("/users")
                .header("host", "api.local")
                .header("content-type", "text/plain")
                .body(Full::new(Bytes::from_static(b"' OR '1'='1"))),
            "SQL_INJECTION_BODY_DETECTED",
        ),
    ];

    for (request, expected) in cases {
        let h = harness(BodyRedactor::default());
        let (status, _, body) = send(&h, request.unwrap()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{expected}");
        assert_eq!(h.hits.load(Ordering::SeqCst), 0, "{expected}");
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["resultCode"], expected);
    }
}

#[tokio::test]
async fn xss_is_rejected() {
    let h = harness(BodyRedactor::default());
    let request = get("/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let (status, _, body) = send(&h, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("XSS_IN_PARAMETER"));
}

#[tokio::test]
async fn clean_request_passes_through_with_security_headers() {
    let h = harness(BodyRedactor::default());
    let request = get("/users?page=2")
        .header("cookie", "session=abc")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let (status, headers, body) = send(&h, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.hits.load(Ordering::SeqCst), 1);
    assert_eq!(body, r#"{"ok":true}"#);
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["content-length"], "11");
}

#[tokio::test]
async fn trace_id_correlates_log_records() {
    let mut h = harness(BodyRedactor::default());

    for _ in 0..2 {
        let request = get("/users")
            .header("x-trace-id", "trace-abc-123")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (_, headers, _) = send(&h, request).await;
        assert_eq!(headers["x-trace-id"], "trace-abc-123");
    }

    let mut directions = Vec::new();
    for _ in 0..4 {
        let record = next_record(&mut h.records).await;
        assert_eq!(record["traceId"], "trace-abc-123");
        directions.push(record["direction"].as_str().unwrap().to_string());
    }
    directions.sort();
    assert_eq!(directions, ["request", "request", "response", "response"]);
}

#[tokio::test]
async fn logged_bodies_are_truncated_then_masked() {
    let mut h = harness(BodyRedactor::new(40, ["password"]));
    let request = http::Request::post("/login")
        .header("host", "api.local")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(
            br#"{"password":"abc","comment":"a long comment that will be cut"}"#,
        )))
        .unwrap();

    let (status, _, _) = send(&h, request).await;
    assert_eq!(status, StatusCode::OK);

    let mut request_record = None;
    for _ in 0..2 {
        let record = next_record(&mut h.records).await;
        if record["direction"] == "request" {
            request_record = Some(record);
        }
    }
    let record = request_record.expect("request record");
    assert_eq!(
        record["body"],
        r#"{"password":"[PROTECTED]","comment":"a long comm... [TRUNCATED]"#
    );
}
