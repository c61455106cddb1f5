//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the stage
//! chain: the correlation id, the peer address, the outcome recorded by a
//! stage that answered early, and typed extensions.

use bulwark_core::{ResponseCode, TraceId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Context that flows through the middleware pipeline.
///
/// One context exists per request and is never shared between requests.
///
/// # Example
///
/// ```
/// use bulwark_middleware::context::MiddlewareContext;
/// use bulwark_core::TraceId;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_trace_id(TraceId::parse("abc-123").unwrap());
///
/// assert_eq!(ctx.trace_id().as_str(), "abc-123");
/// assert!(ctx.blocked_by().is_none());
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Correlation id for this request.
    trace_id: TraceId,

    /// Address of the connected peer, when the host server knows it.
    remote_addr: Option<SocketAddr>,

    /// Set by a stage that answered without calling the next stage.
    blocked_by: Option<ResponseCode>,

    /// When the request started processing.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a context with a freshly generated trace id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_trace_id(TraceId::generate())
    }

    /// Creates a context with a specific trace id.
    #[must_use]
    pub fn with_trace_id(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            remote_addr: None,
            blocked_by: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Sets the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: Option<SocketAddr>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    /// Returns the trace id.
    #[must_use]
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Replaces the trace id.
    ///
    /// Only the trace id stage should call this, before any other stage
    /// has read the id.
    pub fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = trace_id;
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Records that a stage answered the request itself.
    ///
    /// The first recorded code wins.
    pub fn block(&mut self, code: ResponseCode) {
        self.blocked_by.get_or_insert(code);
    }

    /// Returns the code of the stage that answered early, if any.
    #[must_use]
    pub fn blocked_by(&self) -> Option<ResponseCode> {
        self.blocked_by
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use bulwark_middleware::context::MiddlewareContext;
    ///
    /// struct Tenant(&'static str);
    ///
    /// let mut ctx = MiddlewareContext::new();
    /// ctx.set_extension(Tenant("acme"));
    /// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_has_generated_trace_id() {
        let a = MiddlewareContext::new();
        let b = MiddlewareContext::new();
        assert_ne!(a.trace_id(), b.trace_id());
        assert!(a.remote_addr().is_none());
    }

    #[test]
    fn test_remote_addr() {
        let addr: SocketAddr = "10.0.0.7:4431".parse().unwrap();
        let ctx = MiddlewareContext::new().with_remote_addr(Some(addr));
        assert_eq!(ctx.remote_addr(), Some(addr));
    }

    #[test]
    fn test_first_block_wins() {
        let mut ctx = MiddlewareContext::new();
        ctx.block(ResponseCode::CorsOriginPolicyViolation);
        ctx.block(ResponseCode::XssInBody);
        assert_eq!(ctx.blocked_by(), Some(ResponseCode::CorsOriginPolicyViolation));
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct Marker(u8);

        let mut ctx = MiddlewareContext::new();
        assert!(!ctx.has_extension::<Marker>());

        ctx.set_extension(Marker(3));
        assert_eq!(ctx.get_extension::<Marker>(), Some(&Marker(3)));

        assert_eq!(ctx.remove_extension::<Marker>(), Some(Marker(3)));
        assert!(!ctx.has_extension::<Marker>());
    }

    #[test]
    fn test_elapsed_time() {
        let ctx = MiddlewareContext::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(ctx.elapsed() >= std::time::Duration::from_millis(5));
    }
}
