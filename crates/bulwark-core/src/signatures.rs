//! Built-in signature catalogs.
//!
//! These are the defaults used when configuration does not supply its own
//! lists. They are deliberately broad; deployments that accept markup or
//! free-form SQL-like text in inputs should replace them.

use crate::pattern::SignatureSet;

/// Default cross-site scripting signatures.
pub const XSS_SIGNATURES: &[&str] = &[
    r"<script.*?>.*?</script>",
    r"<.*?javascript:.*?>",
    r"<.*?vbscript:.*?>",
    r"<.*?data:.*?>",
    r"<.*?expression\(.*?>",
    r"<.*?onload\s*=.*?>",
    r"<.*?onclick\s*=.*?>",
    r"<.*?onerror\s*=.*?>",
    r"<.*?onmouseover\s*=.*?>",
    r"<.*?onfocus\s*=.*?>",
    r"<.*?onchange\s*=.*?>",
    r"<.*?oninput\s*=.*?>",
    r"<.*?onabort\s*=.*?>",
    r"<.*?onbeforeunload\s*=.*?>",
    r"<.*?src\s*=.*?>",
    r"<.*?href\s*=.*?>",
    r"<.*?background\s*=.*?>",
    r"<iframe.*?>.*?</iframe>",
    r"<object.*?>.*?</object>",
    r"<embed.*?>",
    r"<form.*?>",
    r"<style.*?>",
    r"<.*?data-.*?>",
];

/// Default SQL injection signatures.
pub const SQL_INJECTION_SIGNATURES: &[&str] = &[
    r".*([';]+|(--)).*",
    r".*union.*select.*",
    r".*select.*from.*",
    r".*insert.*into.*",
    r".*update.*set.*",
    r".*delete.*from.*",
];

/// Returns the default XSS catalog as a set.
#[must_use]
pub fn default_xss_signatures() -> SignatureSet {
    SignatureSet::new(XSS_SIGNATURES.iter().copied())
}

/// Returns the default SQL injection catalog as a set.
#[must_use]
pub fn default_sql_injection_signatures() -> SignatureSet {
    SignatureSet::new(SQL_INJECTION_SIGNATURES.iter().copied())
}
