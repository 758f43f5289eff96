//! Sensitive field redaction for captured bodies
//!
//! A [`Redactor`] holds a set of case-insensitive field-name patterns. Any
//! object key matching one of them has its whole value replaced with
//! [`MASK`], whether that value is a scalar, an array or a nested object.
//! Everything else keeps its shape: same keys, same array lengths.
//!
//! ```
//! use serde_json::json;
//! use tracewire_core::Redactor;
//!
//! let redactor = Redactor::from_patterns(["password", "token"]);
//! let body = json!({"user": "ana", "Password": "hunter2", "auth": {"refresh_token": [1, 2]}});
//!
//! let masked = redactor.redact(&body);
//! assert_eq!(masked["Password"], "******");
//! assert_eq!(masked["auth"]["refresh_token"], "******");
//! assert_eq!(masked["user"], "ana");
//! ```

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;

/// Replacement written in place of a masked value
pub const MASK: &str = "******";

/// A compiled field-name pattern
///
/// Patterns are unanchored and case-insensitive, so `token` matches
/// `access_token` and `X-Token` alike.
#[derive(Debug, Clone)]
pub struct RedactionRule {
    pattern: Regex,
}

impl RedactionRule {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|compiled| Self { pattern: compiled })
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// The pattern source
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Check a field name against this rule
    pub fn matches(&self, field: &str) -> bool {
        self.pattern.is_match(field)
    }
}

/// An immutable set of redaction rules
///
/// Cloning is cheap; the rules are shared.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Arc<Vec<RedactionRule>>,
}

impl Redactor {
    /// Create a redactor from already compiled rules
    pub fn new(rules: impl IntoIterator<Item = RedactionRule>) -> Self {
        Self {
            rules: Arc::new(rules.into_iter().collect()),
        }
    }

    /// Compile patterns, dropping any that are invalid
    ///
    /// A bad pattern never disables the valid ones next to it.
    pub fn from_patterns<I>(patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|pattern| match RedactionRule::new(pattern.as_ref()) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    tracing::debug!(error = %err, "dropping redaction pattern");
                    None
                }
            })
            .collect::<Vec<_>>();

        Self {
            rules: Arc::new(rules),
        }
    }

    /// Check if there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Get the compiled rules
    pub fn rules(&self) -> &[RedactionRule] {
        &self.rules
    }

    /// Check if a field name matches any rule
    pub fn should_mask(&self, field: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(field))
    }

    /// Mask matching fields in a parsed document
    ///
    /// With no rules the input is handed back borrowed.
    pub fn redact<'a>(&self, document: &'a Value) -> Cow<'a, Value> {
        if self.rules.is_empty() {
            return Cow::Borrowed(document);
        }
        Cow::Owned(self.mask(document))
    }

    /// Mask matching fields in a JSON body
    ///
    /// Bodies that are empty or do not parse as JSON (including bodies cut
    /// short by truncation) are returned verbatim.
    pub fn redact_body<'a>(&self, body: &'a str) -> Cow<'a, str> {
        if self.rules.is_empty() || body.is_empty() {
            return Cow::Borrowed(body);
        }

        let Ok(document) = serde_json::from_str::<Value>(body) else {
            return Cow::Borrowed(body);
        };

        match serde_json::to_string(self.redact(&document).as_ref()) {
            Ok(masked) => Cow::Owned(masked),
            Err(_) => Cow::Borrowed(body),
        }
    }

    fn mask(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| {
                        let value = if self.should_mask(key) {
                            Value::String(MASK.to_string())
                        } else {
                            self.mask(value)
                        };
                        (key.clone(), value)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.mask(item)).collect()),
            scalar => scalar.clone(),
        }
    }
}
