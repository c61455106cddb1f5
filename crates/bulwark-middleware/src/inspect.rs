//! Shared inspection algorithm for the XSS and SQL injection stages.
//!
//! Both stages run the same scan and differ only in their compiled
//! signatures and in how a [`DetectionSource`] maps to a [`ResponseCode`].
//!
//! Scan order, first match wins:
//!
//! 1. every parameter name, then each of its values (declaration order)
//! 2. every cookie name, then its value
//! 3. the captured body as one string
//!
//! Empty names and values are skipped, so even a fail-closed matcher lets
//! through a request that carries nothing to inspect.
//!
//! Offending values are logged only after passing through a
//! [`BodyRedactor`].

use crate::context::MiddlewareContext;
use crate::middleware::{Next, PipelineResult};
use crate::pipeline::Stage;
use crate::stages::logging::BodyRedactor;
use crate::types::{Request, Response, ResponseExt};
use bulwark_core::request::{cookies, parameters};
use bulwark_core::{
    BodyCapture, CompiledMatcher, DetectionResult, DetectionSource, EnvelopeSerializer,
    ResponseCode,
};
use std::fmt;

/// The class of attack an inspector looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreatClass {
    /// Cross-site scripting.
    Xss,
    /// SQL injection.
    SqlInjection,
}

impl ThreatClass {
    /// Returns the code reported for a match in `source`.
    #[must_use]
    pub const fn code_for(self, source: DetectionSource) -> ResponseCode {
        match (self, source) {
            (Self::Xss, DetectionSource::Parameter) => ResponseCode::XssInParameter,
            (Self::Xss, DetectionSource::Cookie) => ResponseCode::XssInCookie,
            (Self::Xss, DetectionSource::Body) => ResponseCode::XssInBody,
            (Self::SqlInjection, DetectionSource::Parameter) => {
                ResponseCode::SqlInjectionParameterDetected
            }
            (Self::SqlInjection, DetectionSource::Cookie) => ResponseCode::SqlInjectionCookieDetected,
            (Self::SqlInjection, DetectionSource::Body) => ResponseCode::SqlInjectionBodyDetected,
        }
    }

    /// Returns a short label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xss => "xss",
            Self::SqlInjection => "sql_injection",
        }
    }
}

impl fmt::Display for ThreatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scans a captured request with one compiled matcher.
///
/// # Example
///
/// ```
/// use bulwark_core::signatures::default_sql_injection_signatures;
/// use bulwark_core::{CapturedBody, DetectionSource, EmptySignaturePolicy};
/// use bulwark_middleware::inspect::{Inspector, ThreatClass};
///
/// let matcher = default_sql_injection_signatures()
///     .compile(EmptySignaturePolicy::FailOpen)
///     .unwrap();
/// let inspector = Inspector::new(ThreatClass::SqlInjection, matcher);
///
/// let request = http::Request::get("/users?id=1%27%20OR%20%271%27%3D%271")
///     .body(CapturedBody::empty())
///     .unwrap();
///
/// let result = inspector.inspect(&request);
/// assert!(result.matched);
/// assert_eq!(result.source, Some(DetectionSource::Parameter));
/// assert_eq!(result.offending_name.as_deref(), Some("id"));
/// ```
#[derive(Debug, Clone)]
pub struct Inspector {
    class: ThreatClass,
    matcher: CompiledMatcher,
    redactor: BodyRedactor,
}

impl Inspector {
    /// Creates an inspector with the default redactor.
    #[must_use]
    pub fn new(class: ThreatClass, matcher: CompiledMatcher) -> Self {
        Self {
            class,
            matcher,
            redactor: BodyRedactor::default(),
        }
    }

    /// Sets the redactor applied to offending values before they are logged.
    #[must_use]
    pub fn with_redactor(mut self, redactor: BodyRedactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Returns the threat class.
    #[must_use]
    pub fn class(&self) -> ThreatClass {
        self.class
    }

    /// Returns the compiled matcher.
    #[must_use]
    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    /// Runs the scan and returns the first match, or a clean result.
    #[must_use]
    pub fn inspect(&self, request: &Request) -> DetectionResult {
        self.scan_parameters(request)
            .or_else(|| self.scan_cookies(request))
            .or_else(|| self.scan_body(request))
            .unwrap_or_else(DetectionResult::clean)
    }

    /// Returns the code for a result, or `None` if it is clean.
    #[must_use]
    pub fn code_for(&self, result: &DetectionResult) -> Option<ResponseCode> {
        result
            .source
            .filter(|_| result.matched)
            .map(|source| self.class.code_for(source))
    }

    /// Returns the offending value of `result` as it may appear in logs.
    #[must_use]
    pub fn loggable_value(&self, result: &DetectionResult) -> String {
        self.redactor.redact_value(
            result.offending_name.as_deref(),
            result.offending_value.as_deref().unwrap_or(""),
        )
    }

    fn hits(&self, value: &str) -> bool {
        !value.is_empty() && self.matcher.scan(value)
    }

    fn scan_parameters(&self, request: &Request) -> Option<DetectionResult> {
        for (name, values) in &parameters(request) {
            if name.is_empty() {
                continue;
            }
            if self.hits(name) {
                return Some(DetectionResult::hit(
                    DetectionSource::Parameter,
                    Some(name.as_str()),
                    name.as_str(),
                ));
            }
            if let Some(value) = values.iter().find(|v| self.hits(v)) {
                return Some(DetectionResult::hit(
                    DetectionSource::Parameter,
                    Some(name.as_str()),
                    value.as_str(),
                ));
            }
        }
        None
    }

    fn scan_cookies(&self, request: &Request) -> Option<DetectionResult> {
        cookies(request.headers()).into_iter().find_map(|cookie| {
            let value = if self.hits(&cookie.name) {
                cookie.name.clone()
            } else if self.hits(&cookie.value) {
                cookie.value.clone()
            } else {
                return None;
            };
            Some(DetectionResult::hit(
                DetectionSource::Cookie,
                Some(cookie.name.as_str()),
                value,
            ))
        })
    }

    fn scan_body(&self, request: &Request) -> Option<DetectionResult> {
        let body = request.body_text();
        self.hits(&body)
            .then(|| DetectionResult::hit(DetectionSource::Body, None, body.into_owned()))
    }
}

/// Runs `inspector` and either answers with the mapped envelope or calls
/// `next`.
pub(crate) async fn guard(
    stage: Stage,
    inspector: &Inspector,
    serializer: &EnvelopeSerializer,
    ctx: &mut MiddlewareContext,
    request: Request,
    next: Next<'_>,
) -> PipelineResult {
    let result = inspector.inspect(&request);
    let Some(code) = inspector.code_for(&result) else {
        tracing::debug!(stage = stage.name(), "no signature matched");
        return next.run(ctx, request).await;
    };

    tracing::warn!(
        threat = %inspector.class(),
        source = result.source.map_or("unknown", DetectionSource::as_str),
        name = result.offending_name.as_deref().unwrap_or(""),
        value = %inspector.loggable_value(&result),
        code = code.name(),
        "attack signature detected"
    );
    ctx.block(code);
    bulwark_telemetry::metrics::record_blocked(stage.name(), code.name());
    Ok(Response::envelope(serializer, code, ctx.trace_id())?)
}
