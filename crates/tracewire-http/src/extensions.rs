//! Values exchanged with handlers through `http` extensions
//!
//! The interceptor puts [`RequestId`] (and a
//! [`RequestContext`](tracewire_core::RequestContext)) on the request.
//! Handlers may put [`HandlerErrors`] and [`AuthenticatedSubject`] on the
//! response; both end up on the completion event.

use std::fmt;

/// Correlation id assigned to the exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors a handler wants reported with the exchange, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerErrors(Vec<String>);

impl HandlerErrors {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error
    pub fn push(&mut self, error: impl fmt::Display) {
        self.0.push(error.to_string());
    }

    /// Append an error, builder style
    pub fn with(mut self, error: impl fmt::Display) -> Self {
        self.push(error);
        self
    }

    /// Iterate over the errors
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are none
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<E: fmt::Display> FromIterator<E> for HandlerErrors {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self(iter.into_iter().map(|e| e.to_string()).collect())
    }
}

/// Subject the handler authenticated
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthenticatedSubject(String);

impl AuthenticatedSubject {
    /// Wrap a subject id
    pub fn new(id: impl fmt::Display) -> Self {
        Self(id.to_string())
    }

    /// Get the subject id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
