//! The interceptor as a tower layer

use crate::body::{buffer, BodySnapshot, CaptureBody, ReplayBody};
use crate::config::InterceptorConfig;
use crate::exchange::{InterceptedExchange, ResponseCapture, Shared};
use crate::extensions::RequestId;
use futures_util::future::BoxFuture;
use http::{HeaderMap, HeaderValue, Method, Request, Response};
use http_body::Body;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracewire_core::{
    Event, Failure, RequestContext, Severity, SharedSink, TraceRouter, TracingSink,
};
use tracing::Instrument;

/// Layer that applies [`RequestInterceptor`]
///
/// # Example
///
/// ```ignore
/// use tower::ServiceBuilder;
/// use tracewire_http::{InterceptorConfig, RequestInterceptorLayer};
///
/// let service = ServiceBuilder::new()
///     .layer(RequestInterceptorLayer::new(
///         InterceptorConfig::new().skip_path("/health"),
///     ))
///     .service(app);
/// ```
#[derive(Clone)]
pub struct RequestInterceptorLayer {
    shared: Arc<Shared>,
}

impl RequestInterceptorLayer {
    /// Create a layer that writes through `tracing`
    pub fn new(config: InterceptorConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink::new()))
    }

    /// Create a layer that writes to the given sink
    pub fn with_sink(config: InterceptorConfig, sink: SharedSink) -> Self {
        let router = TraceRouter::new(config.verbosity);
        Self {
            shared: Arc::new(Shared {
                config,
                sink,
                router,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &InterceptorConfig {
        &self.shared.config
    }
}

impl Default for RequestInterceptorLayer {
    fn default() -> Self {
        Self::new(InterceptorConfig::default())
    }
}

impl fmt::Debug for RequestInterceptorLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInterceptorLayer")
            .field("config", &self.shared.config)
            .finish()
    }
}

impl<S> Layer<S> for RequestInterceptorLayer {
    type Service = RequestInterceptor<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestInterceptor {
            inner,
            shared: self.shared.clone(),
        }
    }
}

/// Service that observes each exchange passing through it
///
/// The inner service receives the request with its body wrapped in a
/// [`ReplayBody`]; the response body comes back wrapped in a [`CaptureBody`].
/// Neither changes the bytes seen on either side.
#[derive(Clone)]
pub struct RequestInterceptor<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> RequestInterceptor<S> {
    /// Get the inner service
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: fmt::Debug> fmt::Debug for RequestInterceptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInterceptor")
            .field("inner", &self.inner)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestInterceptor<S>
where
    S: Service<Request<ReplayBody<ReqBody>>, Response = Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Body + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Send,
    ResBody: Body,
{
    type Response = Response<CaptureBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The readied service handles this request; a fresh clone takes its place.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = self.shared.clone();

        if shared.config.is_skipped(req.uri().path()) {
            let fut = inner.call(req.map(ReplayBody::passthrough));
            return Box::pin(async move {
                Ok::<_, S::Error>(fut.await?.map(CaptureBody::passthrough))
            });
        }

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let config = &shared.config;

            let request_id = resolve_request_id(&parts.headers, config);
            let mut exchange = InterceptedExchange::new(&parts, request_id.clone());
            let ctx = RequestContext::with_request_id(request_id.clone());
            parts.extensions.insert(ctx.clone());
            parts.extensions.insert(RequestId::new(request_id));

            let body = if config.capture_request_body && has_body(&parts.method) {
                let (replay, captured) = buffer(body).await;
                if let Some(bytes) = captured {
                    let limit = config.max_body_size;
                    exchange.capture_request_body(&bytes, &config.redactor, limit);
                }
                replay
            } else {
                ReplayBody::passthrough(body)
            };

            if let Some(severity) = shared.router.route(Failure::None, false) {
                shared.sink.emit(severity, &Event::Received(exchange.received()));
            }

            exchange.dispatch();
            let response = inner
                .call(Request::from_parts(parts, body))
                .instrument(ctx.span())
                .await?;

            let (mut parts, body) = response.into_parts();
            if let Ok(value) = HeaderValue::from_str(exchange.request_id()) {
                parts
                    .headers
                    .entry(config.request_id_header.clone())
                    .or_insert(value);
            }

            let status = parts.status;
            let severity = shared
                .router
                .route_status(status.as_u16(), config.is_ignorable(status));
            let snapshot = (config.capture_response_body
                && severity.is_some_and(|s| s >= Severity::Warn))
            .then(|| BodySnapshot::new(config.max_body_size));
            exchange.respond(&parts, snapshot);

            let capture = ResponseCapture::new(exchange, severity, shared.clone());
            Ok::<_, S::Error>(Response::from_parts(parts, CaptureBody::new(body, capture)))
        })
    }
}

/// Reuse a non-empty inbound id verbatim, otherwise generate one
fn resolve_request_id(headers: &HeaderMap, config: &InterceptorConfig) -> String {
    headers
        .get(&config.request_id_header)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| config.id_mode.generate())
}

fn has_body(method: &Method) -> bool {
    ![Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(method)
}
