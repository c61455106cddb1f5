//! Cross-site scripting inspection stage.

use crate::context::MiddlewareContext;
use crate::inspect::{guard, Inspector, ThreatClass};
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::pipeline::Stage;
use crate::stages::logging::BodyRedactor;
use crate::types::Request;
use bulwark_core::{CompiledMatcher, EnvelopeSerializer};
use std::sync::Arc;

/// Rejects requests whose parameters, cookies, or body match an XSS
/// signature.
///
/// A match answers with `403` and one of `XSS_IN_PARAMETER`,
/// `XSS_IN_COOKIE` or `XSS_IN_BODY`. The handler is not called.
///
/// # Example
///
/// ```
/// use bulwark_core::signatures::{default_xss_signatures, XSS_SIGNATURES};
/// use bulwark_core::EmptySignaturePolicy;
/// use bulwark_middleware::stages::XssMiddleware;
///
/// let matcher = default_xss_signatures()
///     .compile(EmptySignaturePolicy::FailOpen)
///     .unwrap();
/// let xss = XssMiddleware::new(matcher);
/// assert_eq!(xss.inspector().matcher().signature_count(), XSS_SIGNATURES.len());
/// ```
#[derive(Debug, Clone)]
pub struct XssMiddleware {
    inspector: Inspector,
    serializer: Arc<EnvelopeSerializer>,
}

impl XssMiddleware {
    /// Creates the stage with the default serializer.
    #[must_use]
    pub fn new(matcher: CompiledMatcher) -> Self {
        Self::with_serializer(matcher, Arc::default())
    }

    /// Creates the stage with a shared serializer.
    #[must_use]
    pub fn with_serializer(matcher: CompiledMatcher, serializer: Arc<EnvelopeSerializer>) -> Self {
        Self {
            inspector: Inspector::new(ThreatClass::Xss, matcher),
            serializer,
        }
    }

    /// Sets the redactor applied to offending values in detection logs.
    #[must_use]
    pub fn with_redactor(mut self, redactor: BodyRedactor) -> Self {
        self.inspector = self.inspector.with_redactor(redactor);
        self
    }

    /// Returns the inspector.
    #[must_use]
    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }
}

impl Middleware for XssMiddleware {
    fn name(&self) -> &'static str {
        Stage::Xss.name()
    }

    fn precedence(&self) -> u8 {
        Stage::Xss.precedence()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(guard(
            Stage::Xss,
            &self.inspector,
            &self.serializer,
            ctx,
            request,
            next,
        ))
    }
}
