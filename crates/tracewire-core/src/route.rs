//! Severity routing for finished operations
//!
//! [`TraceRouter`] turns the outcome of an HTTP exchange or a database
//! statement into a [`Severity`], or into nothing when the configured
//! [`Verbosity`] does not let the event through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Severity of an emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Normal completion
    Info,
    /// Slow call or client-side failure
    Warn,
    /// Failure that needs attention
    Error,
}

impl Severity {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much gets emitted
///
/// Ordered so that a more verbose level compares greater:
/// `Silent < Error < Warn < Info`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Nothing is emitted
    Silent,
    /// Only failures
    Error,
    /// Failures and slow calls
    Warn,
    /// Everything
    #[default]
    Info,
}

impl Verbosity {
    /// Check if events of the given severity pass
    pub fn permits(&self, severity: Severity) -> bool {
        let required = match severity {
            Severity::Error => Verbosity::Error,
            Severity::Warn => Verbosity::Warn,
            Severity::Info => Verbosity::Info,
        };
        *self >= required
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(Self::Silent),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            other => Err(format!("unknown verbosity `{other}`")),
        }
    }
}

/// Outcome of the observed call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Failure {
    /// The call succeeded
    #[default]
    None,
    /// The call failed in an expected way (e.g. record not found)
    Ignorable,
    /// The call failed
    Actionable,
}

impl Failure {
    /// Classify an optional error with an ignorable predicate
    pub fn from_error<E: ?Sized>(error: Option<&E>, ignorable: impl FnOnce(&E) -> bool) -> Self {
        match error {
            None => Self::None,
            Some(err) if ignorable(err) => Self::Ignorable,
            Some(_) => Self::Actionable,
        }
    }

    /// Check if a failure of any kind happened
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Picks the severity of a finished operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceRouter {
    verbosity: Verbosity,
}

impl TraceRouter {
    /// Create a router for the given verbosity
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Get the verbosity
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Route an outcome
    ///
    /// An ignorable failure suppresses the event entirely rather than being
    /// downgraded. A slow call that also failed is reported once, as error.
    pub fn route(&self, failure: Failure, degraded: bool) -> Option<Severity> {
        let severity = match failure {
            Failure::Ignorable => return None,
            Failure::Actionable => Severity::Error,
            Failure::None if degraded => Severity::Warn,
            Failure::None => Severity::Info,
        };
        self.verbosity.permits(severity).then_some(severity)
    }

    /// Route a timed outcome; `elapsed` must exceed `threshold` to be slow
    pub fn route_elapsed(
        &self,
        elapsed: Duration,
        threshold: Duration,
        failure: Failure,
    ) -> Option<Severity> {
        self.route(failure, elapsed > threshold)
    }

    /// Route an HTTP status
    ///
    /// 5xx is a failure, 4xx is degraded, anything else is normal. A status
    /// reported ignorable is a suppressed failure.
    pub fn route_status(&self, status: u16, ignorable: bool) -> Option<Severity> {
        if ignorable {
            return self.route(Failure::Ignorable, false);
        }
        match status {
            500..=u16::MAX => self.route(Failure::Actionable, false),
            400..=499 => self.route(Failure::None, true),
            _ => self.route(Failure::None, false),
        }
    }
}
