//! Request data accessors used by the inspectors.
//!
//! Parameters follow the usual servlet-style merge: query-string pairs first,
//! then pairs from an `application/x-www-form-urlencoded` body, grouped by
//! name in the order names first appear.

use crate::capture::CapturedRequest;
use http::header::{CONTENT_TYPE, COOKIE};
use http::HeaderMap;
use indexmap::IndexMap;

/// Parameters grouped by name, in declaration order.
pub type Parameters = IndexMap<String, Vec<String>>;

/// A single `name=value` pair from a `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// The cookie name.
    pub name: String,
    /// The cookie value, with surrounding quotes removed.
    pub value: String,
}

/// Returns all request parameters.
///
/// # Example
///
/// ```
/// use bulwark_core::capture::CapturedBody;
/// use bulwark_core::request::parameters;
///
/// let request = http::Request::post("/search?q=rust&tag=a")
///     .header("content-type", "application/x-www-form-urlencoded")
///     .body(CapturedBody::from("tag=b&page=2"))
///     .unwrap();
///
/// let params = parameters(&request);
/// let names: Vec<_> = params.keys().map(String::as_str).collect();
/// assert_eq!(names, ["q", "tag", "page"]);
/// assert_eq!(params["tag"], ["a", "b"]);
/// ```
#[must_use]
pub fn parameters(request: &CapturedRequest) -> Parameters {
    let mut params = Parameters::new();

    if let Some(query) = request.uri().query() {
        extend_pairs(&mut params, query);
    }

    if is_form_encoded(request.headers()) && !request.body().is_empty() {
        extend_pairs(&mut params, &request.body().text());
    }

    params
}

fn extend_pairs(params: &mut Parameters, encoded: &str) {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded).unwrap_or_default();
    for (name, value) in pairs {
        params.entry(name).or_default().push(value);
    }
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Returns every cookie from every `Cookie` header, in order.
///
/// Fragments without `=` or with an empty name are skipped.
#[must_use]
pub fn cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.trim().trim_matches('"').to_string(),
            })
        })
        .collect()
}
