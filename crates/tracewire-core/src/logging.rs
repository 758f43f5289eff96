//! Console subscriber setup
//!
//! [`TracingSink`](crate::sink::TracingSink) writes through `tracing`, so
//! something has to install a subscriber. Applications that already do so
//! can skip this module.
//!
//! ```ignore
//! use tracewire_core::logging::{self, Environment, LoggingConfig};
//!
//! logging::init(&LoggingConfig::new(Environment::current()).level("debug"))?;
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable read by [`Environment::current`]
pub const ENV_VAR: &str = "TRACEWIRE_ENV";

/// Deployment environment, selects the output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Human readable, coloured output
    #[default]
    Development,
    /// One JSON object per line
    Production,
}

impl Environment {
    /// Read the environment from `TRACEWIRE_ENV`
    ///
    /// Unset or unrecognised values mean development.
    pub fn current() -> Self {
        std::env::var(ENV_VAR)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Check if this is production
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub(crate) environment: Environment,
    pub(crate) level: String,
    pub(crate) with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

impl LoggingConfig {
    /// Create settings for an environment at `info` level
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            level: "info".to_string(),
            with_target: true,
        }
    }

    /// Set the default filter, used when `RUST_LOG` is unset
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Include the event target in output
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Get the environment
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Build the filter, preferring `RUST_LOG`
    pub fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|_| Error::InvalidFilter(self.level.clone()))
    }
}

/// Install the global subscriber
///
/// Fails if the filter is invalid or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.environment {
        Environment::Production => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
        Environment::Development => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_target(config.with_target),
            )
            .try_init(),
    };

    installed.map_err(|err| Error::Subscriber(err.to_string()))
}

/// Install the global subscriber for the current environment
pub fn init_with_defaults() -> Result<()> {
    init(&LoggingConfig::new(Environment::current()))
}
