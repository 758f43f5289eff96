//! Error types for tracewire setup
//!
//! Only configuration and startup paths return these. Interception itself
//! never fails: problems there degrade the emitted diagnostic instead.

use thiserror::Error;

/// Result type alias for tracewire setup operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Setup-time error
#[derive(Debug, Error)]
pub enum Error {
    /// A redaction pattern failed to compile
    #[error("invalid redaction pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The pattern as supplied
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// A log level or filter directive could not be parsed
    #[error("invalid log filter `{0}`")]
    InvalidFilter(String),

    /// The global subscriber could not be installed
    #[error("failed to install subscriber: {0}")]
    Subscriber(String),

    /// Settings could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}
