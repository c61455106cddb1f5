//! Security response headers.
//!
//! Sets `X-Frame-Options`, `X-XSS-Protection` and `X-Content-Type-Options`
//! on every response that passes back through this stage. Existing values
//! are replaced, not appended to.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::pipeline::Stage;
use crate::types::Request;
use http::header::{InvalidHeaderValue, HeaderName, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION};
use http::HeaderValue;

/// Default `X-Frame-Options` value.
pub const DEFAULT_FRAME_OPTIONS: &str = "DENY";

/// Default `X-XSS-Protection` value.
pub const DEFAULT_XSS_PROTECTION: &str = "1; mode=block";

/// Default `X-Content-Type-Options` value.
pub const DEFAULT_CONTENT_TYPE_OPTIONS: &str = "nosniff";

/// The header values to inject. A blank value disables that header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeaders {
    /// `X-Frame-Options`.
    pub frame_options: String,
    /// `X-XSS-Protection`.
    pub xss_protection: String,
    /// `X-Content-Type-Options`.
    pub content_type_options: String,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self {
            frame_options: DEFAULT_FRAME_OPTIONS.to_string(),
            xss_protection: DEFAULT_XSS_PROTECTION.to_string(),
            content_type_options: DEFAULT_CONTENT_TYPE_OPTIONS.to_string(),
        }
    }
}

/// Middleware that injects [`SecurityHeaders`] into responses.
///
/// # Example
///
/// ```
/// use bulwark_middleware::stages::{SecurityHeaders, SecurityHeadersMiddleware};
///
/// let headers = SecurityHeaders {
///     frame_options: "SAMEORIGIN".into(),
///     ..SecurityHeaders::default()
/// };
/// let middleware = SecurityHeadersMiddleware::new(&headers).unwrap();
/// assert_eq!(middleware.headers().count(), 3);
///
/// let bad = SecurityHeaders {
///     frame_options: "DE\nNY".into(),
///     ..SecurityHeaders::default()
/// };
/// assert!(SecurityHeadersMiddleware::new(&bad).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct SecurityHeadersMiddleware {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for SecurityHeadersMiddleware {
    fn default() -> Self {
        Self {
            headers: vec![
                (X_FRAME_OPTIONS, HeaderValue::from_static(DEFAULT_FRAME_OPTIONS)),
                (X_XSS_PROTECTION, HeaderValue::from_static(DEFAULT_XSS_PROTECTION)),
                (
                    X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static(DEFAULT_CONTENT_TYPE_OPTIONS),
                ),
            ],
        }
    }
}

impl SecurityHeadersMiddleware {
    /// Creates the stage, validating every non-blank value.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not a valid header value.
    pub fn new(config: &SecurityHeaders) -> Result<Self, InvalidHeaderValue> {
        let mut headers = Vec::with_capacity(3);
        for (name, value) in [
            (X_FRAME_OPTIONS, &config.frame_options),
            (X_XSS_PROTECTION, &config.xss_protection),
            (X_CONTENT_TYPE_OPTIONS, &config.content_type_options),
        ] {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            headers.push((name, HeaderValue::from_str(value)?));
        }
        Ok(Self { headers })
    }

    /// Returns the headers this stage sets.
    pub fn headers(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(name, value)| (name, value))
    }
}

impl Middleware for SecurityHeadersMiddleware {
    fn name(&self) -> &'static str {
        Stage::SecurityHeaders.name()
    }

    fn precedence(&self) -> u8 {
        Stage::SecurityHeaders.precedence()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let mut response = next.run(ctx, request).await?;
            let target = response.headers_mut();
            for (name, value) in &self.headers {
                target.insert(name.clone(), value.clone());
            }
            Ok(response)
        })
    }
}
