//! Signature-based pattern engine.
//!
//! A [`SignatureSet`] is an ordered, deduplicated list of regular expression
//! fragments. [`SignatureSet::compile`] validates every fragment on its own,
//! then joins them into one case-insensitive alternation. The resulting
//! [`CompiledMatcher`] is built once per configuration load and answers a
//! single question per value: does any signature match anywhere in it?
//!
//! `.` also matches line breaks, so a signature such as
//! `<script.*?>.*?</script>` still matches when the payload is split across
//! lines.
//!
//! # Empty sets
//!
//! An empty set has no natural meaning, so the caller picks one through
//! [`EmptySignaturePolicy`]: fail open (never matches) or fail closed
//! (always matches).
//!
//! Inspectors only scan non-empty values. Under fail closed, a request
//! carrying any non-empty inspected value is rejected; a request with
//! nothing to inspect still passes.
//!
//! # Example
//!
//! ```
//! use bulwark_core::pattern::{EmptySignaturePolicy, SignatureSet};
//!
//! let set = SignatureSet::new(["union.*select", "<script"]);
//! let matcher = set.compile(EmptySignaturePolicy::FailOpen).unwrap();
//!
//! assert!(matcher.scan("1 UNION ALL SELECT password"));
//! assert!(matcher.scan("<SCRIPT>alert(1)</script>"));
//! assert!(!matcher.scan("hello world"));
//! ```

use crate::error::PatternError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the compiled alternation size.
const COMPILED_SIZE_LIMIT: usize = 16 * (1 << 20);

/// What an empty signature set does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySignaturePolicy {
    /// Never match: the inspector is effectively disabled.
    #[default]
    FailOpen,
    /// Always match: a request with any non-empty inspected value is
    /// rejected.
    FailClosed,
}

/// An ordered, deduplicated list of signature fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SignatureSet {
    signatures: Vec<String>,
}

impl SignatureSet {
    /// Builds a set, trimming entries, dropping blanks, and keeping the first
    /// occurrence of each duplicate.
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for signature in signatures {
            set.push(signature);
        }
        set
    }

    /// Appends a signature unless it is blank or already present.
    pub fn push(&mut self, signature: impl Into<String>) {
        let signature = signature.into();
        let trimmed = signature.trim();
        if trimmed.is_empty() || self.signatures.iter().any(|s| s == trimmed) {
            return;
        }
        self.signatures.push(trimmed.to_string());
    }

    /// Returns the signatures in order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.signatures
    }

    /// Returns the number of signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns true if the set has no signatures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Checks that every fragment compiles on its own.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidSignature`] for the first bad fragment.
    pub fn validate(&self) -> Result<(), PatternError> {
        for (index, signature) in self.signatures.iter().enumerate() {
            build(signature).map_err(|source| PatternError::InvalidSignature {
                index,
                signature: signature.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Compiles the set into a single matcher.
    ///
    /// Each fragment is wrapped in a non-capturing group before joining, so
    /// a fragment containing its own top-level `|` cannot leak into its
    /// neighbours.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidSignature`] if a fragment does not
    /// compile on its own, or [`PatternError::Alternation`] if the joined
    /// pattern does not.
    pub fn compile(&self, policy: EmptySignaturePolicy) -> Result<CompiledMatcher, PatternError> {
        self.validate()?;

        let strategy = if self.signatures.is_empty() {
            Strategy::Constant(policy == EmptySignaturePolicy::FailClosed)
        } else {
            let joined = self
                .signatures
                .iter()
                .map(|s| format!("(?:{s})"))
                .collect::<Vec<_>>()
                .join("|");
            Strategy::Regex(build(&joined).map_err(PatternError::Alternation)?)
        };

        Ok(CompiledMatcher {
            strategy,
            signature_count: self.signatures.len(),
            policy,
        })
    }
}

impl From<Vec<String>> for SignatureSet {
    fn from(signatures: Vec<String>) -> Self {
        Self::new(signatures)
    }
}

impl From<SignatureSet> for Vec<String> {
    fn from(set: SignatureSet) -> Self {
        set.signatures
    }
}

impl<S: Into<String>> FromIterator<S> for SignatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

fn build(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .size_limit(COMPILED_SIZE_LIMIT)
        .build()
}

#[derive(Debug, Clone)]
enum Strategy {
    Regex(Regex),
    Constant(bool),
}

/// A compiled signature set.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    strategy: Strategy,
    signature_count: usize,
    policy: EmptySignaturePolicy,
}

impl CompiledMatcher {
    /// Returns true if any signature matches anywhere in `value`.
    #[must_use]
    pub fn scan(&self, value: &str) -> bool {
        match &self.strategy {
            Strategy::Regex(regex) => regex.is_match(value),
            Strategy::Constant(result) => *result,
        }
    }

    /// Returns the number of signatures compiled into this matcher.
    #[must_use]
    pub fn signature_count(&self) -> usize {
        self.signature_count
    }

    /// Returns true if the matcher was built from an empty set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signature_count == 0
    }

    /// Returns the policy used for an empty set.
    #[must_use]
    pub fn policy(&self) -> EmptySignaturePolicy {
        self.policy
    }

    /// Returns the combined pattern, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.strategy {
            Strategy::Regex(regex) => Some(regex.as_str()),
            Strategy::Constant(_) => None,
        }
    }
}

/// Where an inspected value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// A query-string or form parameter name or value.
    Parameter,
    /// A cookie name or value.
    Cookie,
    /// The request body.
    Body,
}

impl DetectionSource {
    /// Returns the source as a lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parameter => "parameter",
            Self::Cookie => "cookie",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of inspecting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    /// Whether a signature matched.
    pub matched: bool,
    /// Where the match was found. `None` when nothing matched.
    pub source: Option<DetectionSource>,
    /// Parameter or cookie name the match belongs to.
    pub offending_name: Option<String>,
    /// The value that matched.
    pub offending_value: Option<String>,
}

impl DetectionResult {
    /// A result with no match.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            matched: false,
            source: None,
            offending_name: None,
            offending_value: None,
        }
    }

    /// A match in `source`.
    #[must_use]
    pub fn hit(
        source: DetectionSource,
        name: Option<&str>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            matched: true,
            source: Some(source),
            offending_name: name.map(str::to_string),
            offending_value: Some(value.into()),
        }
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !self.matched
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::clean()
    }
}
