//! SQL statement classification
//!
//! Classification is advisory: it picks the statement kind from its leading
//! keyword and makes a best-effort guess at the target table. Joins,
//! subqueries and anything unusual simply yield an empty table name.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Kind of statement, from its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// `SELECT ...`
    Select,
    /// `INSERT ...`
    Insert,
    /// `UPDATE ...`
    Update,
    /// `DELETE ...`
    Delete,
    /// Anything else
    Other,
}

impl Operation {
    /// Detect the operation from statement text
    pub fn detect(statement: &str) -> Self {
        let head = statement.trim_start();
        // Checked in this order; the first prefix wins.
        [
            ("SELECT", Self::Select),
            ("INSERT", Self::Insert),
            ("UPDATE", Self::Update),
            ("DELETE", Self::Delete),
        ]
        .into_iter()
        .find(|(keyword, _)| starts_with_ignore_case(head, keyword))
        .map(|(_, operation)| operation)
        .unwrap_or(Self::Other)
    }

    /// Upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Statement kind
    pub operation: Operation,
    /// Target table, empty when it could not be determined
    pub table: String,
}

impl Classification {
    /// Build a classification
    pub fn new(operation: Operation, table: impl Into<String>) -> Self {
        Self {
            operation,
            table: table.into(),
        }
    }

    /// Classification used when nothing could be derived
    pub fn unknown() -> Self {
        Self::new(Operation::Other, String::new())
    }
}

/// Something that can classify statement text
///
/// Implementations must not panic; unrecognised input should produce
/// [`Classification::unknown`] or an empty table.
pub trait StatementClassifier: Send + Sync + 'static {
    /// Classify a statement
    fn classify(&self, statement: &str) -> Classification;
}

impl<F> StatementClassifier for F
where
    F: Fn(&str) -> Classification + Send + Sync + 'static,
{
    fn classify(&self, statement: &str) -> Classification {
        self(statement)
    }
}

/// Keyword-pattern classifier
///
/// Looks for the first identifier after `FROM` (SELECT, DELETE), `INTO`
/// (INSERT) or `UPDATE` (UPDATE). Identifiers may be wrapped in double quotes
/// or backticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    /// Create the classifier
    pub fn new() -> Self {
        Self
    }

    fn table(statement: &str, operation: Operation) -> String {
        let pattern = match operation {
            Operation::Select | Operation::Delete => from_pattern(),
            Operation::Insert => into_pattern(),
            Operation::Update => update_pattern(),
            Operation::Other => return String::new(),
        };

        pattern
            .captures(statement)
            .and_then(|captures| captures.get(1))
            .map(|table| table.as_str().to_string())
            .unwrap_or_default()
    }
}

impl StatementClassifier for PatternClassifier {
    fn classify(&self, statement: &str) -> Classification {
        let statement = statement.trim();
        let operation = Operation::detect(statement);
        Classification::new(operation, Self::table(statement, operation))
    }
}

/// Classify a statement with the default [`PatternClassifier`]
///
/// ```
/// use tracewire_core::{classify, Operation};
///
/// let c = classify("SELECT * FROM users WHERE id = 1");
/// assert_eq!(c.operation, Operation::Select);
/// assert_eq!(c.table, "users");
/// ```
pub fn classify(statement: &str) -> Classification {
    PatternClassifier.classify(statement)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

fn keyword_pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("keyword pattern is valid"))
}

fn from_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    keyword_pattern(&PATTERN, r#"(?i)\bFROM\s+["`]?(\w+)["`]?"#)
}

fn into_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    keyword_pattern(&PATTERN, r#"(?i)\bINTO\s+["`]?(\w+)["`]?"#)
}

fn update_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    keyword_pattern(&PATTERN, r#"(?i)\bUPDATE\s+["`]?(\w+)["`]?"#)
}
