//! # tracewire
//!
//! Structured logging for HTTP exchanges and the database statements they
//! issue, correlated by request id.
//!
//! - [`RequestInterceptorLayer`] wraps any tower service. It assigns or
//!   echoes a correlation id and emits "received" and "completed" events.
//!   On errors the completed event carries redacted, size-bounded body
//!   snapshots.
//! - [`QueryInterceptor`] times statements, classifies them, flags slow
//!   calls and reports them with the request's correlation identifiers.
//! - [`init_logging`] installs a `tracing` subscriber: pretty output in
//!   development, JSON in production.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tracewire::prelude::*;
//!
//! tracewire::init_logging(&LoggingConfig::new(Environment::current()))?;
//!
//! let app = tower::ServiceBuilder::new()
//!     .layer(RequestInterceptorLayer::new(
//!         InterceptorConfig::new()
//!             .skip_path("/health")
//!             .mask_patterns(["password", "token"]),
//!     ))
//!     .service(router);
//!
//! let queries = QueryInterceptor::new(QueryConfig::new());
//!
//! async fn handler(req: Request<Body>) -> Response<Body> {
//!     let ctx = req.extensions().get::<RequestContext>().cloned().unwrap_or_default();
//!     let rows = queries.instrument(&ctx, "SELECT * FROM users", fetch_users()).await;
//!     // ...
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `config` - [`Settings`] loaded from `TRACEWIRE_*` variables and `.env` files
//! - `diesel` - Diesel connection instrumentation, `NotFound` treated as "record not found"
//! - `sqlx` - `RowNotFound` treated as "record not found"
//! - `full` - All optional features enabled
//!
//! ```toml
//! [dependencies]
//! tracewire = { version = "0.1", features = ["config", "diesel"] }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "config")]
mod settings;

// Re-export core functionality
pub use tracewire_core::{
    classify, context, event, redact, route, sink, sql, Classification, CompletedEvent,
    Environment, Error, Event, EventSink, Failure, LoggingConfig, MemorySink, MessageEvent,
    NullSink, Operation, PatternClassifier, QueryEvent, ReceivedEvent, Record, RedactionRule,
    Redactor, RequestContext, Result, Severity, SharedSink, StatementClassifier, TraceRouter,
    TracingSink, Verbosity, MASK,
};

// Re-export the HTTP interceptor
pub use tracewire_http::{
    client_ip, AuthenticatedSubject, BodySnapshot, CaptureBody, HandlerErrors, IdMode,
    InterceptedExchange, InterceptorConfig, Phase, ReplayBody, RequestId, RequestInterceptor,
    RequestInterceptorLayer, StatusPredicate, DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_ID_HEADER,
    TRUNCATION_MARKER,
};

// Re-export the statement interceptor
pub use tracewire_db::{
    is_record_not_found, ErrorPredicate, QueryConfig, QueryInterceptor, RecordNotFound, RowCount,
    DEFAULT_SLOW_THRESHOLD,
};

#[cfg(feature = "diesel")]
pub use tracewire_db::DieselInstrumentation;

#[cfg(feature = "config")]
pub use settings::{Settings, PREFIX as ENV_PREFIX};

/// Install the global `tracing` subscriber
///
/// Fails if a subscriber is already installed or the level is not a valid
/// filter directive.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracewire_core::logging::init(config)
}

/// Prelude module - import everything you need with `use tracewire::prelude::*`
pub mod prelude {
    pub use tracewire_core::{
        Environment, Event, EventSink, LoggingConfig, MemorySink, RequestContext, Severity,
        Verbosity,
    };
    pub use tracewire_db::{QueryConfig, QueryInterceptor, RecordNotFound};
    pub use tracewire_http::{
        AuthenticatedSubject, HandlerErrors, IdMode, InterceptorConfig, RequestId,
        RequestInterceptorLayer,
    };

    #[cfg(feature = "diesel")]
    pub use tracewire_db::DieselInstrumentation;

    #[cfg(feature = "config")]
    pub use crate::settings::Settings;

    pub use tracing::{debug, error, info, trace, warn};
}
