//! Diagnostic events produced by the interceptors
//!
//! Every event serializes as a flat JSON object tagged with an `event` field
//! (`received`, `completed`, `query` or `message`). Durations serialize as
//! whole milliseconds under `duration_ms`.

use crate::context::RequestContext;
use crate::sql::Operation;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// An event handed to an [`EventSink`](crate::sink::EventSink)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// An exchange entered the interceptor
    Received(ReceivedEvent),
    /// An exchange finished
    Completed(CompletedEvent),
    /// A database statement finished
    Query(QueryEvent),
    /// A free-form database log line
    Message(MessageEvent),
}

impl Event {
    /// Human readable summary
    pub fn message(&self) -> &str {
        match self {
            Self::Received(_) => "Request received",
            Self::Completed(event) => event.message(),
            Self::Query(event) => event.message(),
            Self::Message(event) => &event.message,
        }
    }

    /// Correlation id, if the event has one
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Received(event) => Some(&event.request_id),
            Self::Completed(event) => Some(&event.request_id),
            Self::Query(event) => event.context.request_id.as_deref(),
            Self::Message(event) => event.context.request_id.as_deref(),
        }
    }

    /// Get the received event, if this is one
    pub fn as_received(&self) -> Option<&ReceivedEvent> {
        match self {
            Self::Received(event) => Some(event),
            _ => None,
        }
    }

    /// Get the completed event, if this is one
    pub fn as_completed(&self) -> Option<&CompletedEvent> {
        match self {
            Self::Completed(event) => Some(event),
            _ => None,
        }
    }

    /// Get the query event, if this is one
    pub fn as_query(&self) -> Option<&QueryEvent> {
        match self {
            Self::Query(event) => Some(event),
            _ => None,
        }
    }
}

impl From<ReceivedEvent> for Event {
    fn from(event: ReceivedEvent) -> Self {
        Self::Received(event)
    }
}

impl From<CompletedEvent> for Event {
    fn from(event: CompletedEvent) -> Self {
        Self::Completed(event)
    }
}

impl From<QueryEvent> for Event {
    fn from(event: QueryEvent) -> Self {
        Self::Query(event)
    }
}

impl From<MessageEvent> for Event {
    fn from(event: MessageEvent) -> Self {
        Self::Message(event)
    }
}

/// Emitted before the handler runs; never carries a body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedEvent {
    /// Correlation id
    pub request_id: String,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Raw query string, empty when absent
    pub query: String,
    /// Client address, empty when unknown
    pub client_ip: String,
    /// `User-Agent` header, empty when absent
    pub user_agent: String,
}

/// Emitted once the response body has been fully sent or dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedEvent {
    /// Correlation id
    pub request_id: String,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Response status code
    pub status: u16,
    /// Time from request entry to completion
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    /// Client address, empty when unknown
    pub client_ip: String,
    /// HTTP version, e.g. `HTTP/1.1`
    pub protocol: String,
    /// Host the request was addressed to
    pub host: String,
    /// Raw query string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    /// Bytes of response body sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    /// Authenticated subject reported by the handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Redacted request body snapshot, only on warn and error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Redacted response body snapshot, only on warn and error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Errors the handler reported, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub handler_errors: Vec<String>,
}

impl CompletedEvent {
    /// Summary line chosen from the status class
    pub fn message(&self) -> &'static str {
        match self.status {
            500..=u16::MAX => "Request completed with server error",
            400..=499 => "Request completed with client error",
            _ => "Request completed",
        }
    }

    /// Duration in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        millis(self.duration)
    }
}

/// Emitted for each traced database statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryEvent {
    /// Correlation identifiers of the unit of work
    #[serde(flatten)]
    pub context: RequestContext,
    /// Statement kind
    pub operation: Operation,
    /// Target table, may be empty
    pub table: String,
    /// Execution time
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    /// Rows affected, `-1` when unknown
    pub rows_affected: i64,
    /// Execution time exceeded the slow threshold
    pub slow: bool,
    /// Execution error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Statement text
    pub sql: String,
    /// Source location that issued the statement
    pub caller: String,
}

impl QueryEvent {
    /// Summary line; a failed slow query reads as failed
    pub fn message(&self) -> &'static str {
        if self.error.is_some() {
            "Database query failed"
        } else if self.slow {
            "Slow database query detected"
        } else {
            "Database query executed"
        }
    }

    /// Duration in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        millis(self.duration)
    }
}

/// Free-form log line from the database layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEvent {
    /// Correlation identifiers of the unit of work
    #[serde(flatten)]
    pub context: RequestContext,
    /// The message
    pub message: String,
    /// Source location that logged it
    pub caller: String,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(millis(*duration))
}
