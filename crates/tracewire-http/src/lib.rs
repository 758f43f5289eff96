//! # tracewire-http
//!
//! Request/response interception for tower services.
//!
//! [`RequestInterceptorLayer`] assigns every exchange a correlation id,
//! emits a "received" event before the handler runs and a "completed" event
//! once the response body has been sent. On client and server errors the
//! completion event carries redacted snapshots of both bodies.
//!
//! ```ignore
//! use tower::ServiceBuilder;
//! use tracewire_http::{InterceptorConfig, RequestInterceptorLayer};
//!
//! let app = ServiceBuilder::new()
//!     .layer(RequestInterceptorLayer::new(
//!         InterceptorConfig::new()
//!             .skip_paths(["/health"])
//!             .mask_patterns(["password", "token"]),
//!     ))
//!     .service(router);
//! ```
//!
//! This crate is re-exported by `tracewire`.

#![warn(missing_docs)]

mod body;
mod config;
mod exchange;
mod extensions;
mod layer;

pub use body::{BodySnapshot, CaptureBody, ReplayBody, TRUNCATION_MARKER};
pub use config::{
    IdMode, InterceptorConfig, StatusPredicate, DEFAULT_MAX_BODY_SIZE, DEFAULT_REQUEST_ID_HEADER,
};
pub use exchange::{client_ip, InterceptedExchange, Phase};
pub use extensions::{AuthenticatedSubject, HandlerErrors, RequestId};
pub use layer::{RequestInterceptor, RequestInterceptorLayer};
