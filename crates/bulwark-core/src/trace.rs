//! Per-request correlation identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Maximum accepted length of a client-supplied trace id.
pub const MAX_TRACE_ID_LEN: usize = 128;

/// Correlation id joining the request log record, the response log record,
/// and any envelope sent for the same request.
///
/// A trace id is either propagated from an inbound header or generated as a
/// random UUID. Propagated values are restricted to a conservative character
/// set so they can be echoed into headers and logs unescaped.
///
/// # Example
///
/// ```
/// use bulwark_core::TraceId;
///
/// let propagated = TraceId::parse("abc-123").unwrap();
/// assert_eq!(propagated.as_str(), "abc-123");
///
/// assert!(TraceId::parse("").is_none());
/// assert!(TraceId::parse("has space").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Arc<str>);

impl TraceId {
    /// Generates a fresh random trace id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Accepts a client-supplied trace id if it is well formed.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || value.len() > MAX_TRACE_ID_LEN {
            return None;
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
        {
            return None;
        }
        Some(Self(Arc::from(value)))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for TraceId {
    fn from(uuid: Uuid) -> Self {
        Self(Arc::from(uuid.to_string()))
    }
}
