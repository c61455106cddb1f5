//! Core middleware trait and types.
//!
//! Every pipeline stage implements [`Middleware`]. A stage receives the
//! per-request context, the captured request, and a [`Next`] handle for the
//! rest of the chain. It either answers the request itself or calls
//! [`Next::run`] and post-processes what comes back. Errors returned by a
//! stage or the handler travel up the chain to
//! [`Pipeline::handle`](crate::Pipeline::handle), which answers with the
//! matching envelope.
//!
//! # Example
//!
//! ```
//! use bulwark_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, PipelineResult, Request};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, PipelineResult> {
//!         Box::pin(async move {
//!             let response = next.run(ctx, request).await?;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "request finished");
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::error::PipelineError;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a stage or the handler hands back up the chain.
pub type PipelineResult = Result<Response, PipelineError>;

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once; [`Next`] is consumed by the call
/// - A stage that answers the request itself does not call `next` at all
/// - Stages keep no per-request state in `self`
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    ///
    /// Used for logging, metrics labels, and [`Pipeline::stage_names`](crate::Pipeline::stage_names).
    fn name(&self) -> &'static str;

    /// Returns the stage precedence. Lower values run first.
    ///
    /// Built-in stages return their [`Stage`](crate::Stage) value. The
    /// default places custom stages after all built-in ones.
    fn precedence(&self) -> u8 {
        u8::MAX
    }

    /// Process the request through this stage.
    ///
    /// # Errors
    ///
    /// Returns any error from the rest of the chain, or one raised by the
    /// stage itself.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult>;
}

/// Handle to the remainder of the chain.
///
/// Consumed by [`run`](Self::run), so the next stage runs at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(
        Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> + Send + 'a>,
    ),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, PipelineResult> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage or the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever error the invoked stage or handler returns.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> PipelineResult {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}
