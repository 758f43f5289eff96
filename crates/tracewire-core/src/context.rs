//! Correlation identifiers carried between layers
//!
//! The HTTP interceptor inserts a [`RequestContext`] into request extensions;
//! handlers pass it on to database calls so query events carry the same
//! `request_id` as the exchange that issued them.

use serde::Serialize;
use tracing::field::Empty;
use tracing::Span;

/// Correlation identifiers for the current unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// Correlation id of the exchange
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Authenticated subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Distributed trace id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl RequestContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for a correlation id
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self::new().request_id(request_id)
    }

    /// Set the correlation id
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the authenticated subject
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the trace id
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Check if no identifier is set
    pub fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.user_id.is_none() && self.trace_id.is_none()
    }

    /// Build a span carrying the identifiers that are present
    ///
    /// Events logged inside the span inherit the fields, so handler logs can
    /// be joined with the exchange's own events.
    pub fn span(&self) -> Span {
        let span = tracing::info_span!(
            target: "tracewire",
            "request",
            request_id = Empty,
            user_id = Empty,
            trace_id = Empty,
        );
        if let Some(id) = &self.request_id {
            span.record("request_id", id.as_str());
        }
        if let Some(id) = &self.user_id {
            span.record("user_id", id.as_str());
        }
        if let Some(id) = &self.trace_id {
            span.record("trace_id", id.as_str());
        }
        span
    }
}
