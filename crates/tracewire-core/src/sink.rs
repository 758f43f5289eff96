//! Destinations for emitted events
//!
//! Interceptors never log through a global; they hold a [`SharedSink`] and
//! call [`EventSink::emit`] with an already routed severity.

use crate::event::Event;
use crate::route::Severity;
use std::sync::{Arc, Mutex, MutexGuard};

/// Target used for all events written by [`TracingSink`]
pub const TARGET: &str = "tracewire";

/// Receives routed events
pub trait EventSink: Send + Sync + 'static {
    /// Emit one event
    fn emit(&self, severity: Severity, event: &Event);
}

/// Shared handle to a sink
pub type SharedSink = Arc<dyn EventSink>;

impl<F> EventSink for F
where
    F: Fn(Severity, &Event) + Send + Sync + 'static,
{
    fn emit(&self, severity: Severity, event: &Event) {
        self(severity, event)
    }
}

macro_rules! emit_at {
    ($severity:expr, $($rest:tt)+) => {
        match $severity {
            Severity::Error => tracing::error!(target: TARGET, $($rest)+),
            Severity::Warn => tracing::warn!(target: TARGET, $($rest)+),
            Severity::Info => tracing::info!(target: TARGET, $($rest)+),
        }
    };
}

/// Writes events as `tracing` events with structured fields
///
/// Absent optional fields are left out rather than logged empty.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    service: Option<String>,
    version: Option<String>,
}

impl TracingSink {
    /// Create a sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every event with a service name
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Tag every event with a service version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl EventSink for TracingSink {
    fn emit(&self, severity: Severity, event: &Event) {
        let service = self.service.as_deref();
        let version = self.version.as_deref();

        match event {
            Event::Received(e) => emit_at!(
                severity,
                service,
                version,
                request_id = %e.request_id,
                method = %e.method,
                path = %e.path,
                query = %e.query,
                client_ip = %e.client_ip,
                user_agent = %e.user_agent,
                "{}",
                event.message()
            ),
            Event::Completed(e) => emit_at!(
                severity,
                service,
                version,
                request_id = %e.request_id,
                method = %e.method,
                path = %e.path,
                status_code = e.status,
                duration_ms = e.duration_ms(),
                ip_address = %e.client_ip,
                protocol = %e.protocol,
                host = %e.host,
                query_string = e.query_string.as_deref(),
                response_size = e.response_size,
                user_id = e.user_id.as_deref(),
                request_body = e.request_body.as_deref(),
                response_body = e.response_body.as_deref(),
                handler_errors = (!e.handler_errors.is_empty())
                    .then(|| tracing::field::debug(&e.handler_errors)),
                "{}",
                event.message()
            ),
            Event::Query(e) => emit_at!(
                severity,
                service,
                version,
                request_id = e.context.request_id.as_deref(),
                user_id = e.context.user_id.as_deref(),
                trace_id = e.context.trace_id.as_deref(),
                operation = %e.operation,
                table = %e.table,
                duration_ms = e.duration_ms(),
                rows_affected = e.rows_affected,
                slow = e.slow,
                error = e.error.as_deref(),
                sql = %e.sql,
                caller = %e.caller,
                "{}",
                event.message()
            ),
            Event::Message(e) => emit_at!(
                severity,
                service,
                version,
                request_id = e.context.request_id.as_deref(),
                user_id = e.context.user_id.as_deref(),
                trace_id = e.context.trace_id.as_deref(),
                caller = %e.caller,
                "{}",
                e.message
            ),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _severity: Severity, _event: &Event) {}
}

/// An event captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Routed severity
    pub severity: Severity,
    /// The event
    pub event: Event,
}

/// Collects events in memory
///
/// Clones share the same buffer, so one clone can be handed to an
/// interceptor while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything collected so far
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Snapshot of the collected events
    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of collected records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was collected
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything collected
    pub fn drain(&self) -> Vec<Record> {
        std::mem::take(&mut *self.lock())
    }

    /// Convert to a shared handle
    pub fn shared(&self) -> SharedSink {
        Arc::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        // A panicking emitter elsewhere must not hide what was recorded.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, severity: Severity, event: &Event) {
        self.lock().push(Record {
            severity,
            event: event.clone(),
        });
    }
}
