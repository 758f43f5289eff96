//! Interceptor configuration

use http::{HeaderName, StatusCode};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracewire_core::{Redactor, Verbosity};

/// Default correlation header
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Default body capture limit in bytes
pub const DEFAULT_MAX_BODY_SIZE: usize = 4096;

/// How fresh correlation ids are generated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdMode {
    /// UUIDv7, sortable by creation time
    #[default]
    TimeOrdered,
    /// UUIDv4
    Random,
}

impl IdMode {
    /// Generate an id
    pub fn generate(&self) -> String {
        match self {
            Self::TimeOrdered => uuid::Uuid::now_v7().to_string(),
            Self::Random => uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Decides whether a status is an expected outcome that should not be logged
pub type StatusPredicate = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Configuration for [`RequestInterceptorLayer`](crate::RequestInterceptorLayer)
///
/// # Example
///
/// ```ignore
/// use tracewire_http::InterceptorConfig;
///
/// let config = InterceptorConfig::new()
///     .skip_paths(["/health", "/metrics"])
///     .max_body_size(8 * 1024)
///     .mask_patterns(["password", "token"]);
/// ```
#[derive(Clone)]
pub struct InterceptorConfig {
    pub(crate) request_id_header: HeaderName,
    pub(crate) max_body_size: usize,
    pub(crate) capture_request_body: bool,
    pub(crate) capture_response_body: bool,
    pub(crate) skip_paths: HashSet<String>,
    pub(crate) id_mode: IdMode,
    pub(crate) redactor: Redactor,
    pub(crate) verbosity: Verbosity,
    pub(crate) ignore_status: Option<StatusPredicate>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            request_id_header: HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            capture_request_body: true,
            capture_response_body: true,
            skip_paths: HashSet::new(),
            id_mode: IdMode::default(),
            redactor: Redactor::default(),
            verbosity: Verbosity::default(),
            ignore_status: None,
        }
    }

    /// Set the correlation header
    pub fn request_id_header(mut self, header: HeaderName) -> Self {
        self.request_id_header = header;
        self
    }

    /// Set the body capture limit
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Enable or disable request body capture
    pub fn capture_request_body(mut self, enabled: bool) -> Self {
        self.capture_request_body = enabled;
        self
    }

    /// Enable or disable response body capture
    pub fn capture_response_body(mut self, enabled: bool) -> Self {
        self.capture_response_body = enabled;
        self
    }

    /// Add a path that passes through untouched
    pub fn skip_path(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.insert(path.into());
        self
    }

    /// Add several skipped paths
    pub fn skip_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.skip_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set how fresh ids are generated
    pub fn id_mode(mut self, mode: IdMode) -> Self {
        self.id_mode = mode;
        self
    }

    /// Compile field-name patterns to mask in captured bodies
    ///
    /// Invalid patterns are dropped.
    pub fn mask_patterns<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.redactor = Redactor::from_patterns(patterns);
        self
    }

    /// Use an already built redactor
    pub fn redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Set the minimum verbosity
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Treat matching statuses as expected and emit nothing for them
    pub fn ignore_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        self.ignore_status = Some(Arc::new(predicate));
        self
    }

    /// Get the correlation header
    pub fn header(&self) -> &HeaderName {
        &self.request_id_header
    }

    /// Get the body capture limit
    pub fn body_limit(&self) -> usize {
        self.max_body_size
    }

    /// Check if a path is skipped
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.contains(path)
    }

    pub(crate) fn is_ignorable(&self, status: StatusCode) -> bool {
        self.ignore_status
            .as_ref()
            .map(|predicate| predicate(status))
            .unwrap_or(false)
    }
}

impl fmt::Debug for InterceptorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorConfig")
            .field("request_id_header", &self.request_id_header)
            .field("max_body_size", &self.max_body_size)
            .field("capture_request_body", &self.capture_request_body)
            .field("capture_response_body", &self.capture_response_body)
            .field("skip_paths", &self.skip_paths)
            .field("id_mode", &self.id_mode)
            .field("mask_patterns", &self.redactor.rules().len())
            .field("verbosity", &self.verbosity)
            .field("ignore_status", &self.ignore_status.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InterceptorConfig::default();

        assert_eq!(config.header().as_str(), "x-request-id");
        assert_eq!(config.body_limit(), 4096);
        assert!(config.capture_request_body);
        assert!(config.capture_response_body);
        assert_eq!(config.id_mode, IdMode::TimeOrdered);
        assert_eq!(config.verbosity, Verbosity::Info);
        assert!(config.redactor.is_empty());
        assert!(!config.is_ignorable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_skip_paths_exact_match() {
        let config = InterceptorConfig::new().skip_paths(["/health", "/metrics"]);

        assert!(config.is_skipped("/health"));
        assert!(!config.is_skipped("/health/live"));
        assert!(!config.is_skipped("/"));
    }

    #[test]
    fn test_ignore_status_predicate() {
        let config = InterceptorConfig::new().ignore_status(|s| s == StatusCode::NOT_FOUND);

        assert!(config.is_ignorable(StatusCode::NOT_FOUND));
        assert!(!config.is_ignorable(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_id_modes() {
        let ordered = IdMode::TimeOrdered.generate();
        let random = IdMode::Random.generate();

        assert_eq!(uuid::Uuid::parse_str(&ordered).unwrap().get_version_num(), 7);
        assert_eq!(uuid::Uuid::parse_str(&random).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_debug_hides_predicate() {
        let config = InterceptorConfig::new().mask_patterns(["password"]);
        let debug = format!("{config:?}");

        assert!(debug.contains("mask_patterns: 1"));
        assert!(debug.contains("ignore_status: false"));
    }
}
