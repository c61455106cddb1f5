//! CORS policy evaluation.
//!
//! A [`CorsPolicy`] is checked in a fixed order: a wildcard in any of the
//! origin, method, or header lists allows everything; otherwise the origin is
//! checked, then the method, then the header names. The first failing check
//! decides the violation code.
//!
//! Policies are bound to request paths through a [`CorsRegistry`]. A path
//! with no policy is not a violation.
//!
//! # Example
//!
//! ```
//! use bulwark_core::{CapturedBody, ResponseCode};
//! use bulwark_middleware::cors::{CorsDecision, CorsPolicy};
//!
//! let policy = CorsPolicy::builder()
//!     .allow_origins(["https://good.example"])
//!     .allow_methods(["GET"])
//!     .allow_headers(["origin", "host"])
//!     .build();
//!
//! let request = http::Request::get("https://api.example/items")
//!     .header("origin", "https://evil.example")
//!     .body(CapturedBody::empty())
//!     .unwrap();
//!
//! assert_eq!(
//!     policy.evaluate(&request),
//!     CorsDecision::Deny(ResponseCode::CorsOriginPolicyViolation)
//! );
//! ```

use crate::types::Request;
use bulwark_core::ResponseCode;
use http::header::HOST;
use http::{HeaderMap, Method, Uri};
use indexmap::IndexSet;
use std::time::Duration;

/// The wildcard entry.
pub const WILDCARD: &str = "*";

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
    /// `X-Forwarded-Proto` header, consulted for the request's own scheme.
    pub const FORWARDED_PROTO: &str = "x-forwarded-proto";
}

/// Outcome of evaluating a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsDecision {
    /// Every check passed.
    Allow,
    /// The policy contains a wildcard; nothing was checked.
    AllowAll,
    /// A check failed.
    Deny(ResponseCode),
}

impl CorsDecision {
    /// Returns true unless the decision is [`Deny`](Self::Deny).
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        !matches!(self, Self::Deny(_))
    }
}

/// An allow-list policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    allowed_origins: IndexSet<String>,
    allowed_methods: IndexSet<String>,
    allowed_headers: IndexSet<String>,
    exposed_headers: IndexSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl CorsPolicy {
    /// Creates a builder starting from empty lists.
    #[must_use]
    pub fn builder() -> CorsPolicyBuilder {
        CorsPolicyBuilder::new()
    }

    /// A policy with wildcards in every list and credentials allowed.
    #[must_use]
    pub fn permissive() -> Self {
        CorsPolicyBuilder::new()
            .allow_origins([WILDCARD])
            .allow_methods([WILDCARD])
            .allow_headers([WILDCARD])
            .allow_credentials(true)
            .build()
    }

    /// Returns true if any list contains the wildcard.
    ///
    /// A wildcard in one dimension allows all three.
    #[must_use]
    pub fn allows_all(&self) -> bool {
        self.allowed_origins.contains(WILDCARD)
            || self.allowed_methods.contains(WILDCARD)
            || self.allowed_headers.contains(WILDCARD)
    }

    /// Checks an `Origin` value against the allowed origins.
    ///
    /// Scheme, host, and port must all match one entry. An empty list allows
    /// any origin.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.is_empty() || self.allowed_origins.contains(WILDCARD) {
            return true;
        }
        let Some(origin) = OriginParts::parse(origin) else {
            return false;
        };
        self.allowed_origins
            .iter()
            .filter_map(|allowed| OriginParts::parse(allowed))
            .any(|allowed| allowed == origin)
    }

    /// Checks a method name, case-sensitively. An empty list allows any method.
    #[must_use]
    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods.is_empty()
            || self.allowed_methods.contains(WILDCARD)
            || self.allowed_methods.contains(method)
    }

    /// Checks that every header name is allowed. An empty list allows any.
    #[must_use]
    pub fn are_headers_allowed<'h>(&self, mut names: impl Iterator<Item = &'h str>) -> bool {
        if self.allowed_headers.is_empty() || self.allowed_headers.contains(WILDCARD) {
            return true;
        }
        names.all(|name| {
            let name = name.trim();
            name.is_empty() || self.allowed_headers.contains(name.to_ascii_lowercase().as_str())
        })
    }

    /// Evaluates a cross-origin request.
    ///
    /// For a preflight request the requested method and headers are checked;
    /// for an actual request, its own method and every header name it
    /// carries.
    #[must_use]
    pub fn evaluate(&self, request: &Request) -> CorsDecision {
        if self.allows_all() {
            return CorsDecision::AllowAll;
        }

        let request_headers = request.headers();
        let origin = header_str(request_headers, headers::ORIGIN).unwrap_or_default();
        if !self.is_origin_allowed(origin) {
            return CorsDecision::Deny(ResponseCode::CorsOriginPolicyViolation);
        }

        if is_preflight(request) {
            let method = header_str(request_headers, headers::REQUEST_METHOD).unwrap_or_default();
            if !self.is_method_allowed(method.trim()) {
                return CorsDecision::Deny(ResponseCode::CorsMethodPolicyViolation);
            }
            let requested = header_str(request_headers, headers::REQUEST_HEADERS).unwrap_or_default();
            if !self.are_headers_allowed(requested.split(',')) {
                return CorsDecision::Deny(ResponseCode::CorsHeadersPolicyViolation);
            }
        } else {
            if !self.is_method_allowed(request.method().as_str()) {
                return CorsDecision::Deny(ResponseCode::CorsMethodPolicyViolation);
            }
            if !self.are_headers_allowed(request_headers.keys().map(http::HeaderName::as_str)) {
                return CorsDecision::Deny(ResponseCode::CorsHeadersPolicyViolation);
            }
        }

        CorsDecision::Allow
    }

    /// Returns the allowed origins.
    pub fn allowed_origins(&self) -> impl Iterator<Item = &str> {
        self.allowed_origins.iter().map(String::as_str)
    }

    /// Returns the allowed methods.
    pub fn allowed_methods(&self) -> impl Iterator<Item = &str> {
        self.allowed_methods.iter().map(String::as_str)
    }

    /// Returns the allowed header names, lowercased.
    pub fn allowed_headers(&self) -> impl Iterator<Item = &str> {
        self.allowed_headers.iter().map(String::as_str)
    }

    /// Returns the headers exposed to scripts.
    pub fn exposed_headers(&self) -> impl Iterator<Item = &str> {
        self.exposed_headers.iter().map(String::as_str)
    }

    /// Returns whether credentials are allowed.
    #[must_use]
    pub fn allow_credentials(&self) -> bool {
        self.allow_credentials
    }

    /// Returns the preflight cache duration.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }
}

/// Builder for [`CorsPolicy`].
#[derive(Debug, Clone, Default)]
pub struct CorsPolicyBuilder {
    allowed_origins: IndexSet<String>,
    allowed_methods: IndexSet<String>,
    allowed_headers: IndexSet<String>,
    exposed_headers: IndexSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsPolicyBuilder {
    /// Creates a builder with empty lists, no credentials, and no max age.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allowed origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        push_trimmed(&mut self.allowed_origins, origin.into());
        self
    }

    /// Replaces the allowed origins.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins.clear();
        for origin in origins {
            push_trimmed(&mut self.allowed_origins, origin.into());
        }
        self
    }

    /// Replaces the allowed methods. Method names are kept as given.
    #[must_use]
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_methods.clear();
        for method in methods {
            push_trimmed(&mut self.allowed_methods, method.into());
        }
        self
    }

    /// Replaces the allowed request headers. Names are lowercased.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers.clear();
        for header in headers {
            push_trimmed(&mut self.allowed_headers, header.into().to_ascii_lowercase());
        }
        self
    }

    /// Replaces the headers exposed to scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_headers.clear();
        for header in headers {
            push_trimmed(&mut self.exposed_headers, header.into().to_ascii_lowercase());
        }
        self
    }

    /// Sets whether credentials are allowed.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Sets the preflight cache duration.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    /// Disables preflight caching.
    #[must_use]
    pub fn no_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    /// Builds the policy.
    #[must_use]
    pub fn build(self) -> CorsPolicy {
        CorsPolicy {
            allowed_origins: self.allowed_origins,
            allowed_methods: self.allowed_methods,
            allowed_headers: self.allowed_headers,
            exposed_headers: self.exposed_headers,
            allow_credentials: self.allow_credentials,
            max_age: self.max_age,
        }
    }
}

fn push_trimmed(set: &mut IndexSet<String>, value: String) {
    let value = value.trim();
    if !value.is_empty() {
        set.insert(value.to_string());
    }
}

/// Binds policies to path patterns.
///
/// Patterns are matched in registration order; the first match wins.
///
/// | Pattern      | Matches                         |
/// |--------------|---------------------------------|
/// | `/**`        | every path                      |
/// | `/api/**`    | `/api` and everything below it  |
/// | `/files/*`   | exactly one segment below       |
/// | `/*.json`    | `*` inside a segment            |
/// | `/health`    | that path only                  |
#[derive(Debug, Clone, Default)]
pub struct CorsRegistry {
    entries: Vec<(PathPattern, CorsPolicy)>,
}

impl CorsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with one policy for every path.
    #[must_use]
    pub fn global(policy: CorsPolicy) -> Self {
        Self::new().register("/**", policy)
    }

    /// Binds `policy` to `pattern`.
    #[must_use]
    pub fn register(mut self, pattern: &str, policy: CorsPolicy) -> Self {
        self.entries.push((PathPattern::parse(pattern), policy));
        self
    }

    /// Returns the policy for `path`, if any pattern matches.
    #[must_use]
    pub fn policy_for(&self, path: &str) -> Option<&CorsPolicy> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| policy)
    }

    /// Returns the number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A path pattern with `*` and `**` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
}

impl PathPattern {
    /// Parses a pattern. Empty segments are ignored.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: split_path(pattern).map(str::to_string).collect(),
        }
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if `path` matches.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = split_path(path).collect();
        let pattern: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        match_segments(&pattern, &path)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((head, rest)) => match path.split_first() {
            Some((segment, remaining)) => {
                glob_segment(head, segment) && match_segments(rest, remaining)
            }
            None => false,
        },
    }
}

fn glob_segment(pattern: &str, segment: &str) -> bool {
    let Some((prefix, rest)) = pattern.split_once('*') else {
        return pattern == segment;
    };
    let Some(mut remaining) = segment.strip_prefix(prefix) else {
        return false;
    };
    let mut parts = rest.split('*').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            return remaining.ends_with(part);
        }
        match remaining.find(part) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    true
}

/// Scheme, host, and explicit port of an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OriginParts {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl OriginParts {
    fn parse(value: &str) -> Option<Self> {
        let uri: Uri = value.trim().parse().ok()?;
        Some(Self {
            scheme: uri.scheme_str()?.to_ascii_lowercase(),
            host: uri.host()?.to_ascii_lowercase(),
            port: uri.port_u16(),
        })
    }

    fn effective_port(&self) -> Option<u16> {
        self.port.or(match self.scheme.as_str() {
            "http" | "ws" => Some(80),
            "https" | "wss" => Some(443),
            _ => None,
        })
    }

    fn same_origin(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.effective_port() == other.effective_port()
    }
}

fn header_str<'r>(headers: &'r HeaderMap, name: &str) -> Option<&'r str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Returns true for an `OPTIONS` request carrying `Origin` and
/// `Access-Control-Request-Method`.
#[must_use]
pub fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(headers::ORIGIN)
        && request.headers().contains_key(headers::REQUEST_METHOD)
}

/// Returns true if the request carries an `Origin` that differs from the
/// request's own scheme, host, and port.
///
/// The request's own origin comes from the absolute URI when present,
/// otherwise from `X-Forwarded-Proto` (default `http`) and `Host`.
#[must_use]
pub fn is_cross_origin(request: &Request) -> bool {
    let Some(origin) = header_str(request.headers(), headers::ORIGIN) else {
        return false;
    };
    let Some(origin) = OriginParts::parse(origin) else {
        return true;
    };
    match own_origin(request) {
        Some(own) => !origin.same_origin(&own),
        None => true,
    }
}

fn own_origin(request: &Request) -> Option<OriginParts> {
    let uri = request.uri();
    if let (Some(scheme), Some(host)) = (uri.scheme_str(), uri.host()) {
        return Some(OriginParts {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port: uri.port_u16(),
        });
    }

    let scheme = header_str(request.headers(), headers::FORWARDED_PROTO)
        .and_then(|v| v.split(',').next())
        .map_or("http", str::trim);
    let host = header_str(request.headers(), HOST.as_str())?;
    OriginParts::parse(&format!("{scheme}://{host}"))
}
