//! Response code catalog.
//!
//! Every outcome the pipeline can report to a client is one entry of the
//! closed [`ResponseCode`] catalog. Each entry carries a symbolic name, a
//! four-digit numeric code, a human-readable message, and the HTTP status
//! the envelope is sent with.
//!
//! | Range  | Meaning                   | Status |
//! |--------|---------------------------|--------|
//! | `0000` | success                   | 200    |
//! | `1xxx` | CORS policy violations    | 403    |
//! | `2xxx` | cross-site scripting      | 403    |
//! | `3xxx` | SQL injection             | 400    |
//! | `4001` | JSON processing failure   | 500    |
//! | `9999` | unexpected internal error | 500    |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalog entry describing one reportable outcome.
///
/// # Example
///
/// ```
/// use bulwark_core::ResponseCode;
/// use http::StatusCode;
///
/// let code = ResponseCode::CorsOriginPolicyViolation;
/// assert_eq!(code.name(), "CORS_ORIGIN_POLICY_VIOLATION");
/// assert_eq!(code.code(), "1001");
/// assert_eq!(code.status(), StatusCode::FORBIDDEN);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    /// The request was processed successfully.
    Success,
    /// The request origin is not in the allowed origin list.
    CorsOriginPolicyViolation,
    /// The request method is not in the allowed method list.
    CorsMethodPolicyViolation,
    /// A request header is not in the allowed header list.
    CorsHeadersPolicyViolation,
    /// Cross-site scripting detected without a more specific source.
    XssDetected,
    /// Cross-site scripting detected in a request parameter.
    XssInParameter,
    /// Cross-site scripting detected in a cookie.
    XssInCookie,
    /// Cross-site scripting detected in the request body.
    XssInBody,
    /// SQL injection detected in a request parameter.
    SqlInjectionParameterDetected,
    /// SQL injection detected in the request body.
    SqlInjectionBodyDetected,
    /// SQL injection detected in a cookie.
    SqlInjectionCookieDetected,
    /// A response envelope could not be serialized.
    JsonProcessingError,
    /// An unexpected failure occurred inside the pipeline.
    InternalError,
}

impl ResponseCode {
    /// Returns the symbolic name, e.g. `XSS_IN_BODY`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::CorsOriginPolicyViolation => "CORS_ORIGIN_POLICY_VIOLATION",
            Self::CorsMethodPolicyViolation => "CORS_METHOD_POLICY_VIOLATION",
            Self::CorsHeadersPolicyViolation => "CORS_HEADERS_POLICY_VIOLATION",
            Self::XssDetected => "XSS_DETECTED",
            Self::XssInParameter => "XSS_IN_PARAMETER",
            Self::XssInCookie => "XSS_IN_COOKIE",
            Self::XssInBody => "XSS_IN_BODY",
            Self::SqlInjectionParameterDetected => "SQL_INJECTION_PARAMETER_DETECTED",
            Self::SqlInjectionBodyDetected => "SQL_INJECTION_BODY_DETECTED",
            Self::SqlInjectionCookieDetected => "SQL_INJECTION_COOKIE_DETECTED",
            Self::JsonProcessingError => "JSON_PROCESSING_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Returns the four-digit numeric code, e.g. `2004`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Success => "0000",
            Self::CorsOriginPolicyViolation => "1001",
            Self::CorsMethodPolicyViolation => "1002",
            Self::CorsHeadersPolicyViolation => "1003",
            Self::XssDetected => "2001",
            Self::XssInParameter => "2002",
            Self::XssInCookie => "2003",
            Self::XssInBody => "2004",
            Self::SqlInjectionParameterDetected => "3001",
            Self::SqlInjectionBodyDetected => "3002",
            Self::SqlInjectionCookieDetected => "3003",
            Self::JsonProcessingError => "4001",
            Self::InternalError => "9999",
        }
    }

    /// Returns the client-facing message.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "The request was processed successfully",
            Self::CorsOriginPolicyViolation => "CORS origin policy violation",
            Self::CorsMethodPolicyViolation => "CORS method policy violation",
            Self::CorsHeadersPolicyViolation => "CORS headers policy violation",
            Self::XssDetected => "XSS attack detected",
            Self::XssInParameter => "XSS attack detected in request parameter",
            Self::XssInCookie => "XSS attack detected in cookie",
            Self::XssInBody => "XSS attack detected in request body",
            Self::SqlInjectionParameterDetected => "SQL injection detected in request parameter",
            Self::SqlInjectionBodyDetected => "SQL injection detected in request body",
            Self::SqlInjectionCookieDetected => "SQL injection detected in cookie",
            Self::JsonProcessingError => "An error occurred while processing JSON",
            Self::InternalError => "An internal error occurred",
        }
    }

    /// Returns the HTTP status the envelope is sent with.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::CorsOriginPolicyViolation
            | Self::CorsMethodPolicyViolation
            | Self::CorsHeadersPolicyViolation
            | Self::XssDetected
            | Self::XssInParameter
            | Self::XssInCookie
            | Self::XssInBody => StatusCode::FORBIDDEN,
            Self::SqlInjectionParameterDetected
            | Self::SqlInjectionBodyDetected
            | Self::SqlInjectionCookieDetected => StatusCode::BAD_REQUEST,
            Self::JsonProcessingError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for the success entry.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the code rendered in the requested format.
    #[must_use]
    pub const fn render(self, format: ResultCodeFormat) -> &'static str {
        match format {
            ResultCodeFormat::Symbolic => self.name(),
            ResultCodeFormat::Numeric => self.code(),
        }
    }

    /// Returns every catalog entry.
    #[must_use]
    pub const fn all() -> [ResponseCode; 13] {
        [
            Self::Success,
            Self::CorsOriginPolicyViolation,
            Self::CorsMethodPolicyViolation,
            Self::CorsHeadersPolicyViolation,
            Self::XssDetected,
            Self::XssInParameter,
            Self::XssInCookie,
            Self::XssInBody,
            Self::SqlInjectionParameterDetected,
            Self::SqlInjectionBodyDetected,
            Self::SqlInjectionCookieDetected,
            Self::JsonProcessingError,
            Self::InternalError,
        ]
    }

    /// Looks up an entry by symbolic name or numeric code.
    #[must_use]
    pub fn lookup(value: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|c| c.name() == value || c.code() == value)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Which form of a [`ResponseCode`] is written into `resultCode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCodeFormat {
    /// The symbolic name, e.g. `CORS_ORIGIN_POLICY_VIOLATION`.
    #[default]
    Symbolic,
    /// The numeric code, e.g. `1001`.
    Numeric,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let names: HashSet<_> = ResponseCode::all().iter().map(|c| c.name()).collect();
        let codes: HashSet<_> = ResponseCode::all().iter().map(|c| c.code()).collect();
        assert_eq!(names.len(), ResponseCode::all().len());
        assert_eq!(codes.len(), ResponseCode::all().len());
    }

    #[test]
    fn test_status_by_family() {
        assert_eq!(ResponseCode::Success.status(), StatusCode::OK);
        assert_eq!(
            ResponseCode::CorsHeadersPolicyViolation.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ResponseCode::XssInCookie.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ResponseCode::SqlInjectionBodyDetected.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ResponseCode::JsonProcessingError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_render_formats() {
        let code = ResponseCode::SqlInjectionCookieDetected;
        assert_eq!(
            code.render(ResultCodeFormat::Symbolic),
            "SQL_INJECTION_COOKIE_DETECTED"
        );
        assert_eq!(code.render(ResultCodeFormat::Numeric), "3003");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(
            ResponseCode::lookup("XSS_IN_BODY"),
            Some(ResponseCode::XssInBody)
        );
        assert_eq!(ResponseCode::lookup("1002"), Some(ResponseCode::CorsMethodPolicyViolation));
        assert_eq!(ResponseCode::lookup("nope"), None);
    }

    #[test]
    fn test_serde_uses_symbolic_names() {
        let json = serde_json::to_string(&ResponseCode::XssInParameter).unwrap();
        assert_eq!(json, "\"XSS_IN_PARAMETER\"");
        let format: ResultCodeFormat = serde_json::from_str("\"numeric\"").unwrap();
        assert_eq!(format, ResultCodeFormat::Numeric);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ResponseCode::Success.to_string(),
            "SUCCESS (0000)"
        );
    }
}
