//! Settings loaded from the environment
//!
//! Every field maps to a `TRACEWIRE_`-prefixed variable. Lists are comma
//! separated.
//!
//! ```ignore
//! // TRACEWIRE_ENV=production
//! // TRACEWIRE_SKIP_PATHS=/health,/metrics
//! // TRACEWIRE_MASK_PATTERNS=password,token
//! // TRACEWIRE_SLOW_THRESHOLD_MS=250
//! let settings = tracewire::Settings::load()?;
//!
//! tracewire::init_logging(&settings.logging_config())?;
//! let layer = RequestInterceptorLayer::new(settings.interceptor_config()?);
//! let queries = QueryInterceptor::new(settings.query_config()?);
//! ```

use http::HeaderName;
use serde::Deserialize;
use std::time::Duration;
use tracewire_core::{Environment, Error, LoggingConfig, Result, Verbosity};
use tracewire_db::{QueryConfig, DEFAULT_SLOW_THRESHOLD};
use tracewire_http::{IdMode, InterceptorConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_ID_HEADER};

/// Prefix shared by all variables
pub const PREFIX: &str = "TRACEWIRE_";

/// Raw settings as read from `TRACEWIRE_*` variables
///
/// Unset variables keep the builder defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `TRACEWIRE_ENV`: `development` or `production`
    pub env: String,
    /// `TRACEWIRE_LOG_LEVEL`: level or filter directive
    pub log_level: String,
    /// `TRACEWIRE_REQUEST_ID_HEADER`
    pub request_id_header: String,
    /// `TRACEWIRE_MAX_BODY_SIZE`: bytes kept per captured body
    pub max_body_size: usize,
    /// `TRACEWIRE_CAPTURE_REQUEST_BODY`
    pub capture_request_body: bool,
    /// `TRACEWIRE_CAPTURE_RESPONSE_BODY`
    pub capture_response_body: bool,
    /// `TRACEWIRE_SKIP_PATHS`
    pub skip_paths: Vec<String>,
    /// `TRACEWIRE_ID_MODE`: `time_ordered` or `random`
    pub id_mode: String,
    /// `TRACEWIRE_MASK_PATTERNS`
    pub mask_patterns: Vec<String>,
    /// `TRACEWIRE_VERBOSITY`: exchange verbosity
    pub verbosity: String,
    /// `TRACEWIRE_SLOW_THRESHOLD_MS`
    pub slow_threshold_ms: u64,
    /// `TRACEWIRE_IGNORE_RECORD_NOT_FOUND`
    pub ignore_record_not_found: bool,
    /// `TRACEWIRE_QUERY_VERBOSITY`: statement verbosity
    pub query_verbosity: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Environment::Development.to_string(),
            log_level: "info".to_string(),
            request_id_header: DEFAULT_REQUEST_ID_HEADER.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            capture_request_body: true,
            capture_response_body: true,
            skip_paths: Vec::new(),
            id_mode: "time_ordered".to_string(),
            mask_patterns: Vec::new(),
            verbosity: "info".to_string(),
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD.as_millis() as u64,
            ignore_record_not_found: true,
            query_verbosity: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Load a `.env` file if present, then read the process environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Read the process environment only
    pub fn from_env() -> Result<Self> {
        envy::prefixed(PREFIX)
            .from_env()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Read from explicit key/value pairs, using the same prefixed names
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs.into_iter().map(|(k, v)| (k.into(), v.into()));
        envy::prefixed(PREFIX)
            .from_iter(vars)
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Parsed environment
    pub fn environment(&self) -> Result<Environment> {
        self.env.parse().map_err(Error::Config)
    }

    /// Build the logging configuration
    pub fn logging_config(&self) -> Result<LoggingConfig> {
        Ok(LoggingConfig::new(self.environment()?).level(self.log_level.clone()))
    }

    /// Build the request interceptor configuration
    pub fn interceptor_config(&self) -> Result<InterceptorConfig> {
        let header = HeaderName::from_bytes(self.request_id_header.trim().as_bytes())
            .map_err(|_| {
                Error::Config(format!(
                    "invalid request id header `{}`",
                    self.request_id_header
                ))
            })?;

        Ok(InterceptorConfig::new()
            .request_id_header(header)
            .max_body_size(self.max_body_size)
            .capture_request_body(self.capture_request_body)
            .capture_response_body(self.capture_response_body)
            .skip_paths(list(&self.skip_paths))
            .id_mode(parse_id_mode(&self.id_mode)?)
            .mask_patterns(list(&self.mask_patterns))
            .verbosity(parse_verbosity(&self.verbosity)?))
    }

    /// Build the query interceptor configuration
    pub fn query_config(&self) -> Result<QueryConfig> {
        Ok(QueryConfig::new()
            .slow_threshold(Duration::from_millis(self.slow_threshold_ms))
            .ignore_record_not_found(self.ignore_record_not_found)
            .verbosity(parse_verbosity(&self.query_verbosity)?))
    }
}

fn list(items: &[String]) -> impl Iterator<Item = &str> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
}

fn parse_verbosity(value: &str) -> Result<Verbosity> {
    value.parse().map_err(Error::Config)
}

fn parse_id_mode(value: &str) -> Result<IdMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "time_ordered" | "time-ordered" | "v7" => Ok(IdMode::TimeOrdered),
        "random" | "v4" => Ok(IdMode::Random),
        other => Err(Error::Config(format!("unknown id mode `{other}`"))),
    }
}
