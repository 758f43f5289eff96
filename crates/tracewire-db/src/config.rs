//! Query interceptor configuration

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracewire_core::{PatternClassifier, StatementClassifier, Verbosity};

/// Default slow query threshold
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(200);

/// Decides whether a statement error is expected and should not be logged
pub type ErrorPredicate = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Configuration for [`QueryInterceptor`](crate::QueryInterceptor)
///
/// Defaults: 200ms slow threshold, "record not found" ignored, warn
/// verbosity (failures and slow queries only).
#[derive(Clone)]
pub struct QueryConfig {
    pub(crate) slow_threshold: Duration,
    pub(crate) ignore_record_not_found: bool,
    pub(crate) ignore_error: Option<ErrorPredicate>,
    pub(crate) verbosity: Verbosity,
    pub(crate) classifier: Arc<dyn StatementClassifier>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            ignore_record_not_found: true,
            ignore_error: None,
            verbosity: Verbosity::Warn,
            classifier: Arc::new(PatternClassifier),
        }
    }

    /// Set the slow query threshold
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Set whether "record not found" errors are ignored
    pub fn ignore_record_not_found(mut self, ignore: bool) -> Self {
        self.ignore_record_not_found = ignore;
        self
    }

    /// Treat matching errors as expected and emit nothing for them
    pub fn ignore_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.ignore_error = Some(Arc::new(predicate));
        self
    }

    /// Set the minimum verbosity
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Replace the statement classifier
    pub fn classifier<C: StatementClassifier>(mut self, classifier: C) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Get the slow query threshold
    pub fn threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Get the verbosity
    pub fn level(&self) -> Verbosity {
        self.verbosity
    }
}

impl fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryConfig")
            .field("slow_threshold", &self.slow_threshold)
            .field("ignore_record_not_found", &self.ignore_record_not_found)
            .field("ignore_error", &self.ignore_error.is_some())
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}
