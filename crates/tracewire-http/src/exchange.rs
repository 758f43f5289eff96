//! Per-exchange state
//!
//! An [`InterceptedExchange`] is created when a request enters the
//! interceptor and lives until its completion event has been emitted. It is
//! owned by that exchange alone: first by the service future, then by the
//! response body.

use crate::body::BodySnapshot;
use crate::config::InterceptorConfig;
use crate::extensions::{AuthenticatedSubject, HandlerErrors};
use http::{header, request, response, HeaderMap, Method, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracewire_core::{
    CompletedEvent, Event, ReceivedEvent, Redactor, Severity, SharedSink, TraceRouter,
};

/// Lifecycle of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Request seen, handler not called yet
    Created,
    /// Handler running or response streaming
    Dispatched,
    /// Response finished, event emitted
    Completed,
}

/// State shared by every exchange of one interceptor
pub(crate) struct Shared {
    pub(crate) config: InterceptorConfig,
    pub(crate) sink: SharedSink,
    pub(crate) router: TraceRouter,
}

/// One request/response cycle as seen by the interceptor
#[derive(Debug)]
pub struct InterceptedExchange {
    request_id: String,
    method: Method,
    path: String,
    query: String,
    client_ip: String,
    user_agent: String,
    protocol: String,
    host: String,
    started: Instant,
    status: Option<StatusCode>,
    elapsed: Option<Duration>,
    request_body: Option<BodySnapshot>,
    response_body: Option<BodySnapshot>,
    response_size: u64,
    subject: Option<String>,
    handler_errors: Vec<String>,
    phase: Phase,
}

impl InterceptedExchange {
    /// Start an exchange; the clock starts now
    pub fn new(parts: &request::Parts, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            client_ip: client_ip(parts),
            user_agent: header_str(&parts.headers, header::USER_AGENT).to_string(),
            protocol: format!("{:?}", parts.version),
            host: host(parts),
            started: Instant::now(),
            status: None,
            elapsed: None,
            request_body: None,
            response_body: None,
            response_size: 0,
            subject: None,
            handler_errors: Vec::new(),
            phase: Phase::Created,
        }
    }

    /// Correlation id
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Response status, once known
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Elapsed time, once completed
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Client address, empty when unknown
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    /// Keep a masked, bounded copy of the request body
    ///
    /// The full body is masked before it is cut, so rules still apply to
    /// oversized JSON. The marker reflects the raw length.
    pub(crate) fn capture_request_body(&mut self, body: &[u8], redactor: &Redactor, limit: usize) {
        self.request_body = Some(masked_snapshot(body, body.len() as u64, redactor, limit));
    }

    pub(crate) fn received(&self) -> ReceivedEvent {
        ReceivedEvent {
            request_id: self.request_id.clone(),
            method: self.method.to_string(),
            path: self.path.clone(),
            query: self.query.clone(),
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    pub(crate) fn dispatch(&mut self) {
        self.phase = Phase::Dispatched;
    }

    /// Record the response head; the status is only set once
    pub(crate) fn respond(&mut self, parts: &response::Parts, snapshot: Option<BodySnapshot>) {
        self.status.get_or_insert(parts.status);
        self.response_body = snapshot;

        if let Some(errors) = parts.extensions.get::<HandlerErrors>() {
            self.handler_errors.extend(errors.iter().map(str::to_string));
        }
        if let Some(subject) = parts.extensions.get::<AuthenticatedSubject>() {
            self.subject = Some(subject.as_str().to_string());
        }
    }

    pub(crate) fn record_response(&mut self, data: &[u8]) {
        self.response_size += data.len() as u64;
        if let Some(snapshot) = self.response_body.as_mut() {
            snapshot.push(data);
        }
    }

    pub(crate) fn complete(&mut self) {
        self.elapsed = Some(self.started.elapsed());
        self.phase = Phase::Completed;
    }

    /// Build the completion event
    ///
    /// Bodies are only attached when asked for. The response snapshot is
    /// already cut, so a truncated response is only masked if it still
    /// parses.
    pub(crate) fn completed(
        &self,
        with_bodies: bool,
        redactor: &Redactor,
        limit: usize,
    ) -> CompletedEvent {
        let request_body = self
            .request_body
            .as_ref()
            .filter(|snapshot| with_bodies && !snapshot.is_empty())
            .map(BodySnapshot::render);

        let response_body = self
            .response_body
            .as_ref()
            .filter(|_| with_bodies)
            .map(|snapshot| {
                masked_snapshot(snapshot.as_bytes(), snapshot.seen(), redactor, limit).render()
            });

        CompletedEvent {
            request_id: self.request_id.clone(),
            method: self.method.to_string(),
            path: self.path.clone(),
            status: self.status.map_or(0, |s| s.as_u16()),
            duration: self.elapsed.unwrap_or_else(|| self.started.elapsed()),
            client_ip: self.client_ip.clone(),
            protocol: self.protocol.clone(),
            host: self.host.clone(),
            query_string: (!self.query.is_empty()).then(|| self.query.clone()),
            response_size: (self.response_size > 0).then_some(self.response_size),
            user_id: self.subject.clone(),
            request_body,
            response_body,
            handler_errors: self.handler_errors.clone(),
        }
    }
}

/// Completes an exchange when its response body finishes or is dropped
pub(crate) struct ResponseCapture {
    exchange: Option<InterceptedExchange>,
    severity: Option<Severity>,
    shared: Arc<Shared>,
}

impl ResponseCapture {
    pub(crate) fn new(
        exchange: InterceptedExchange,
        severity: Option<Severity>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            exchange: Some(exchange),
            severity,
            shared,
        }
    }

    pub(crate) fn record(&mut self, data: &[u8]) {
        if let Some(exchange) = self.exchange.as_mut() {
            exchange.record_response(data);
        }
    }

    pub(crate) fn finish(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        let Some(mut exchange) = self.exchange.take() else {
            return;
        };
        exchange.complete();

        let Some(severity) = self.severity else {
            return;
        };
        let config = &self.shared.config;
        let with_bodies = severity >= Severity::Warn;
        let event = exchange.completed(with_bodies, &config.redactor, config.max_body_size);
        self.shared.sink.emit(severity, &Event::Completed(event));
    }
}

impl Drop for ResponseCapture {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Resolve the client address
///
/// First valid address in `X-Forwarded-For`, then `X-Real-IP`, then a
/// [`SocketAddr`] request extension. Empty when none is available.
pub fn client_ip(parts: &request::Parts) -> String {
    let forwarded = header_str(&parts.headers, "x-forwarded-for")
        .split(',')
        .find_map(|candidate| candidate.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| header_str(&parts.headers, "x-real-ip").trim().parse().ok())
        .or_else(|| parts.extensions.get::<SocketAddr>().map(SocketAddr::ip))
        .map(|ip| ip.to_string())
        .unwrap_or_default()
}

/// Mask `raw` and cut the result to `limit`, counting `total` bytes as seen
fn masked_snapshot(raw: &[u8], total: u64, redactor: &Redactor, limit: usize) -> BodySnapshot {
    let text = String::from_utf8_lossy(raw);
    let masked = redactor.redact_body(&text);
    BodySnapshot::of(masked.as_bytes(), limit).covering(total)
}

fn host(parts: &request::Parts) -> String {
    match header_str(&parts.headers, header::HOST) {
        "" => parts.uri.host().unwrap_or_default().to_string(),
        host => host.to_string(),
    }
}

fn header_str<K: header::AsHeaderName>(headers: &HeaderMap, name: K) -> &str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
