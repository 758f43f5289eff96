//! # tracewire-core
//!
//! Building blocks shared by the tracewire interceptors.
//!
//! This crate is not meant to be used directly. Use `tracewire` instead.
//!
//! - [`redact`] masks sensitive fields in JSON bodies before they are logged
//! - [`sql`] derives an operation and table name from raw statement text
//! - [`route`] decides the severity of a finished operation
//! - [`event`] and [`sink`] describe what gets emitted and where it goes
//! - [`context`] carries correlation identifiers between layers

#![warn(missing_docs)]

pub mod context;
mod error;
pub mod event;
pub mod logging;
pub mod redact;
pub mod route;
pub mod sink;
pub mod sql;

// Public API
pub use context::RequestContext;
pub use error::{Error, Result};
pub use event::{CompletedEvent, Event, MessageEvent, QueryEvent, ReceivedEvent};
pub use logging::{Environment, LoggingConfig};
pub use redact::{RedactionRule, Redactor, MASK};
pub use route::{Failure, Severity, TraceRouter, Verbosity};
pub use sink::{EventSink, MemorySink, NullSink, Record, SharedSink, TracingSink};
pub use sql::{classify, Classification, Operation, PatternClassifier, StatementClassifier};
