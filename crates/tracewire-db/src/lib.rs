//! # tracewire-db
//!
//! Database statement tracing.
//!
//! [`QueryInterceptor`] times a statement, classifies it into an operation
//! and a table, flags slow calls and reports a structured event carrying the
//! request's correlation identifiers. Expected "record not found" errors are
//! not reported by default.
//!
//! ```ignore
//! use std::time::Duration;
//! use tracewire_db::{QueryConfig, QueryInterceptor};
//!
//! let queries = QueryInterceptor::new(
//!     QueryConfig::new().slow_threshold(Duration::from_millis(100)),
//! );
//!
//! let users: Vec<User> = queries
//!     .instrument(&ctx, "SELECT * FROM users", fetch_users(&pool))
//!     .await?;
//! ```
//!
//! ## Optional Features
//!
//! - `diesel` - [`DieselInstrumentation`] and recognition of `NotFound`
//! - `sqlx` - recognition of `RowNotFound`

#![warn(missing_docs)]

mod config;
#[cfg(feature = "diesel")]
mod diesel;
mod interceptor;
mod not_found;
mod rows;

pub use config::{ErrorPredicate, QueryConfig, DEFAULT_SLOW_THRESHOLD};
#[cfg(feature = "diesel")]
pub use self::diesel::DieselInstrumentation;
pub use interceptor::QueryInterceptor;
pub use not_found::{is_record_not_found, RecordNotFound};
pub use rows::RowCount;
