//! SQL injection inspection stage.
//!
//! Same scan as the XSS stage with its own catalog. Matches answer with
//! `400 Bad Request`.

use crate::context::MiddlewareContext;
use crate::inspect::{guard, Inspector, ThreatClass};
use crate::middleware::{BoxFuture, Middleware, Next, PipelineResult};
use crate::pipeline::Stage;
use crate::stages::logging::BodyRedactor;
use crate::types::Request;
use bulwark_core::{CompiledMatcher, EnvelopeSerializer};
use std::sync::Arc;

/// Rejects requests matching a SQL injection signature.
#[derive(Debug, Clone)]
pub struct SqlInjectionMiddleware {
    inspector: Inspector,
    serializer: Arc<EnvelopeSerializer>,
}

impl SqlInjectionMiddleware {
    /// Creates the stage with the default serializer.
    #[must_use]
    pub fn new(matcher: CompiledMatcher) -> Self {
        Self::with_serializer(matcher, Arc::default())
    }

    /// Creates the stage with a shared serializer.
    #[must_use]
    pub fn with_serializer(matcher: CompiledMatcher, serializer: Arc<EnvelopeSerializer>) -> Self {
        Self {
            inspector: Inspector::new(ThreatClass::SqlInjection, matcher),
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

impl Middleware for SqlInjectionMiddleware {
    fn name(&self) -> &'static str {
        Stage::SqlInjection.name()
    }

    fn precedence(&self) -> u8 {
        Stage::SqlInjection.precedence()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(guard(
            Stage::SqlInjection,
            &self.inspector,
            &self.serializer,
            ctx,
            request,
            next,
        ))
    }
}
