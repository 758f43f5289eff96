//! Diesel integration
//!
//! ```ignore
//! use tracewire_db::{DieselInstrumentation, QueryConfig, QueryInterceptor};
//!
//! let queries = QueryInterceptor::new(QueryConfig::new());
//! conn.set_instrumentation(DieselInstrumentation::new(queries).context(ctx));
//! ```

use crate::interceptor::QueryInterceptor;
use diesel::connection::{Instrumentation, InstrumentationEvent};
use std::time::Instant;
use tracewire_core::RequestContext;

/// Reports every statement a Diesel connection runs
///
/// Diesel does not report affected rows to instrumentation, so they are
/// always `-1`.
#[derive(Debug)]
pub struct DieselInstrumentation {
    queries: QueryInterceptor,
    context: RequestContext,
    started: Option<Instant>,
}

impl DieselInstrumentation {
    /// Wrap an interceptor
    pub fn new(queries: QueryInterceptor) -> Self {
        Self {
            queries,
            context: RequestContext::default(),
            started: None,
        }
    }

    /// Attach correlation identifiers to the reported statements
    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the correlation identifiers, e.g. when a pooled connection
    /// is checked out for another request
    pub fn set_context(&mut self, context: RequestContext) {
        self.context = context;
    }
}

impl Instrumentation for DieselInstrumentation {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { .. } => {
                self.started = Some(Instant::now());
            }
            InstrumentationEvent::FinishQuery { query, error, .. } => {
                let begin = self.started.take().unwrap_or_else(Instant::now);
                let error = error.map(|err| err as &(dyn std::error::Error + 'static));
                self.queries
                    .record(&self.context, begin, || (query.to_string(), -1), error, None);
            }
            _ => {}
        }
    }
}
