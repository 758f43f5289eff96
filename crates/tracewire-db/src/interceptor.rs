//! Statement tracing

use crate::config::QueryConfig;
use crate::not_found::is_record_not_found;
use crate::rows::RowCount;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Arc;
use std::time::Instant;
use tracewire_core::{
    Classification, Event, Failure, MessageEvent, QueryEvent, RequestContext, Severity,
    SharedSink, TraceRouter, TracingSink, Verbosity,
};

/// Times, classifies and reports database statements
///
/// Cheap to clone; clones share configuration and sink.
///
/// # Example
///
/// ```ignore
/// use std::time::Instant;
/// use tracewire_db::{QueryConfig, QueryInterceptor};
///
/// let queries = QueryInterceptor::new(QueryConfig::new());
///
/// let begin = Instant::now();
/// let result = conn.execute(sql);
/// queries.trace(&ctx, begin, || (sql.to_string(), affected(&result)), result.as_ref().err());
/// ```
#[derive(Clone)]
pub struct QueryInterceptor {
    config: QueryConfig,
    sink: SharedSink,
    router: TraceRouter,
}

impl QueryInterceptor {
    /// Create an interceptor that writes through `tracing`
    pub fn new(config: QueryConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink::new()))
    }

    /// Create an interceptor that writes to the given sink
    pub fn with_sink(config: QueryConfig, sink: SharedSink) -> Self {
        let router = TraceRouter::new(config.verbosity);
        Self {
            config,
            sink,
            router,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Copy of this interceptor at another verbosity
    pub fn log_mode(&self, verbosity: Verbosity) -> Self {
        let mut copy = self.clone();
        copy.config.verbosity = verbosity;
        copy.router = TraceRouter::new(verbosity);
        copy
    }

    /// Report one finished statement
    ///
    /// `statement` yields the statement text and rows affected; it is only
    /// called when an event is going to be emitted. Never panics.
    #[track_caller]
    pub fn trace<F>(
        &self,
        ctx: &RequestContext,
        begin: Instant,
        statement: F,
        error: Option<&(dyn StdError + 'static)>,
    ) where
        F: FnOnce() -> (String, i64),
    {
        self.record(ctx, begin, statement, error, Some(Location::caller()));
    }

    /// Run a statement future and report it
    ///
    /// Rows affected come from the result's [`RowCount`]; a failed statement
    /// reports `-1`.
    #[track_caller]
    pub fn instrument<'a, Q, Fut, T, E>(
        &'a self,
        ctx: &'a RequestContext,
        sql: Q,
        future: Fut,
    ) -> impl Future<Output = Result<T, E>> + 'a
    where
        Q: Into<String> + 'a,
        Fut: Future<Output = Result<T, E>> + 'a,
        T: RowCount + 'a,
        E: StdError + 'static,
    {
        let caller = Location::caller();
        let sql = sql.into();

        async move {
            let begin = Instant::now();
            let result = future.await;

            let rows = result.as_ref().map_or(-1, RowCount::row_count);
            let error = result.as_ref().err().map(|err| err as &(dyn StdError + 'static));
            self.record(ctx, begin, move || (sql, rows), error, Some(caller));

            result
        }
    }

    /// Free-form info message
    #[track_caller]
    pub fn info(&self, ctx: &RequestContext, message: impl fmt::Display) {
        self.message(Severity::Info, ctx, message, Location::caller());
    }

    /// Free-form warning
    #[track_caller]
    pub fn warn(&self, ctx: &RequestContext, message: impl fmt::Display) {
        self.message(Severity::Warn, ctx, message, Location::caller());
    }

    /// Free-form error
    #[track_caller]
    pub fn error(&self, ctx: &RequestContext, message: impl fmt::Display) {
        self.message(Severity::Error, ctx, message, Location::caller());
    }

    pub(crate) fn record<F>(
        &self,
        ctx: &RequestContext,
        begin: Instant,
        statement: F,
        error: Option<&(dyn StdError + 'static)>,
        caller: Option<&Location<'_>>,
    ) where
        F: FnOnce() -> (String, i64),
    {
        if self.config.verbosity == Verbosity::Silent {
            return;
        }

        let elapsed = begin.elapsed();
        let slow = elapsed > self.config.slow_threshold;
        let failure = Failure::from_error(error, |err| self.is_ignorable(err));

        let Some(severity) = self
            .router
            .route_elapsed(elapsed, self.config.slow_threshold, failure)
        else {
            return;
        };

        let (sql, rows_affected) = statement();
        let Classification { operation, table } = self.classify(&sql);

        let event = QueryEvent {
            context: ctx.clone(),
            operation,
            table,
            duration: elapsed,
            rows_affected,
            slow,
            error: error.map(ToString::to_string),
            sql,
            caller: caller.map(format_location).unwrap_or_default(),
        };
        self.sink.emit(severity, &Event::Query(event));
    }

    fn classify(&self, sql: &str) -> Classification {
        // A custom classifier must not take the statement path down with it.
        panic::catch_unwind(AssertUnwindSafe(|| self.config.classifier.classify(sql)))
            .unwrap_or_else(|_| {
                tracing::debug!("statement classifier panicked");
                Classification::unknown()
            })
    }

    fn is_ignorable(&self, err: &(dyn StdError + 'static)) -> bool {
        (self.config.ignore_record_not_found && is_record_not_found(err))
            || self
                .config
                .ignore_error
                .as_ref()
                .is_some_and(|predicate| predicate(err))
    }

    fn message(
        &self,
        severity: Severity,
        ctx: &RequestContext,
        message: impl fmt::Display,
        caller: &Location<'_>,
    ) {
        if !self.config.verbosity.permits(severity) {
            return;
        }
        let event = MessageEvent {
            context: ctx.clone(),
            message: message.to_string(),
            caller: format_location(caller),
        };
        self.sink.emit(severity, &Event::Message(event));
    }
}

impl fmt::Debug for QueryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryInterceptor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn format_location(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::not_found::RecordNotFound;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::time::Duration;
    use tracewire_core::{MemorySink, Operation};

    #[derive(Debug, thiserror::Error)]
    #[error("deadlock detected")]
    struct Deadlock;

    fn interceptor(config: QueryConfig) -> (QueryInterceptor, MemorySink) {
        let sink = MemorySink::new();
        (QueryInterceptor::with_sink(config, sink.shared()), sink)
    }

    fn ago(ms: u64) -> Instant {
        Instant::now() - Duration::from_millis(ms)
    }

    #[test]
    fn test_fast_query_silent_at_warn() {
        let (queries, sink) = interceptor(QueryConfig::new());
        let evaluated = Cell::new(false);

        queries.trace(
            &RequestContext::new(),
            Instant::now(),
            || {
                evaluated.set(true);
                ("SELECT 1".to_string(), 1)
            },
            None,
        );

        assert!(sink.is_empty());
        assert!(!evaluated.get());
    }

    #[test]
    fn test_slow_query_warns() {
        let config = QueryConfig::new().slow_threshold(Duration::from_millis(50));
        let (queries, sink) = interceptor(config);
        let ctx = RequestContext::with_request_id("r-1");

        queries.trace(&ctx, ago(80), || ("SELECT * FROM users".into(), 12), None);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Warn);

        let event = records[0].event.as_query().unwrap();
        assert_eq!(event.operation, Operation::Select);
        assert_eq!(event.table, "users");
        assert_eq!(event.rows_affected, 12);
        assert!(event.slow);
        assert_eq!(event.context.request_id.as_deref(), Some("r-1"));
        assert!(event.caller.contains("interceptor.rs"));
        assert_eq!(event.message(), "Slow database query detected");
    }

    #[test]
    fn test_error_wins_over_slow() {
        let (queries, sink) = interceptor(QueryConfig::new().slow_threshold(Duration::ZERO));

        queries.trace(
            &RequestContext::new(),
            ago(5),
            || ("UPDATE accounts SET x = 1".into(), 0),
            Some(&Deadlock),
        );

        let records = sink.records();
        assert_eq!(records[0].severity, Severity::Error);
        let event = records[0].event.as_query().unwrap();
        assert_eq!(event.error.as_deref(), Some("deadlock detected"));
        assert_eq!(event.message(), "Database query failed");
    }

    #[test]
    fn test_record_not_found_suppressed() {
        let (queries, sink) = interceptor(QueryConfig::new().verbosity(Verbosity::Info));

        queries.trace(
            &RequestContext::new(),
            ago(500),
            || ("SELECT * FROM users WHERE id = 9".into(), 0),
            Some(&RecordNotFound),
        );

        assert!(sink.is_empty());
    }

    #[test]
    fn test_record_not_found_reported_when_not_ignored() {
        let (queries, sink) = interceptor(QueryConfig::new().ignore_record_not_found(false));

        let ctx = RequestContext::new();
        queries.trace(&ctx, Instant::now(), || ("SELECT 1".into(), 0), Some(&RecordNotFound));

        assert_eq!(sink.records()[0].severity, Severity::Error);
    }

    #[test]
    fn test_custom_ignorable_error() {
        let config = QueryConfig::new().ignore_error(|err| err.is::<Deadlock>());
        let (queries, sink) = interceptor(config);

        let ctx = RequestContext::new();
        queries.trace(&ctx, Instant::now(), || ("SELECT 1".into(), 0), Some(&Deadlock));

        assert!(sink.is_empty());
    }

    #[test]
    fn test_info_logs_everything() {
        let (queries, sink) = interceptor(QueryConfig::new().verbosity(Verbosity::Info));

        let ctx = RequestContext::new();
        queries.trace(&ctx, Instant::now(), || ("DELETE FROM carts".into(), 4), None);

        let records = sink.records();
        assert_eq!(records[0].severity, Severity::Info);
        assert_eq!(records[0].event.message(), "Database query executed");
    }

    #[test]
    fn test_silent_never_evaluates() {
        let (queries, sink) = interceptor(QueryConfig::new().verbosity(Verbosity::Silent));
        let evaluated = Cell::new(false);

        queries.trace(
            &RequestContext::new(),
            ago(1000),
            || {
                evaluated.set(true);
                (String::new(), 0)
            },
            Some(&Deadlock),
        );

        assert!(sink.is_empty());
        assert!(!evaluated.get());
    }

    #[test]
    fn test_log_mode_copies() {
        let (queries, sink) = interceptor(QueryConfig::new());
        let verbose = queries.log_mode(Verbosity::Info);

        verbose.trace(&RequestContext::new(), Instant::now(), || ("SELECT 1".into(), 1), None);
        queries.trace(&RequestContext::new(), Instant::now(), || ("SELECT 1".into(), 1), None);

        assert_eq!(sink.len(), 1);
        assert_eq!(queries.config().level(), Verbosity::Warn);
    }

    #[test]
    fn test_panicking_classifier_degrades() {
        let config = QueryConfig::new()
            .verbosity(Verbosity::Info)
            .classifier(|_: &str| -> Classification { panic!("bad classifier") });
        let (queries, sink) = interceptor(config);

        queries.trace(&RequestContext::new(), Instant::now(), || ("SELECT 1".into(), 1), None);

        let event = sink.events()[0].as_query().cloned().unwrap();
        assert_eq!(event.operation, Operation::Other);
        assert_eq!(event.table, "");
    }

    #[test]
    fn test_messages_gated_by_verbosity() {
        let (queries, sink) = interceptor(QueryConfig::new());
        let ctx = RequestContext::with_request_id("r-2");

        queries.info(&ctx, "connected");
        queries.warn(&ctx, format_args!("pool at {}%", 90));
        queries.error(&ctx, "migration failed");

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event.message(), "pool at 90%");
        assert_eq!(records[1].severity, Severity::Error);
        assert_eq!(records[1].event.request_id(), Some("r-2"));
    }

    #[tokio::test]
    async fn test_instrument_reports_rows() {
        let (queries, sink) = interceptor(QueryConfig::new().verbosity(Verbosity::Info));
        let ctx = RequestContext::new();

        let rows = queries
            .instrument(&ctx, "INSERT INTO orders VALUES (1)", async {
                Ok::<u64, Deadlock>(1)
            })
            .await
            .unwrap();

        assert_eq!(rows, 1);
        let event = sink.events()[0].as_query().cloned().unwrap();
        assert_eq!(event.operation, Operation::Insert);
        assert_eq!(event.table, "orders");
        assert_eq!(event.rows_affected, 1);
    }

    #[tokio::test]
    async fn test_instrument_reports_error() {
        let (queries, sink) = interceptor(QueryConfig::new());
        let ctx = RequestContext::new();

        let result = queries
            .instrument(&ctx, "SELECT * FROM users", async { Err::<Vec<u8>, _>(Deadlock) })
            .await;

        assert!(result.is_err());
        let event = sink.events()[0].as_query().cloned().unwrap();
        assert_eq!(event.rows_affected, -1);
        assert_eq!(event.error.as_deref(), Some("deadlock detected"));
    }

    fn verbosity_strategy() -> impl Strategy<Value = Verbosity> {
        prop_oneof![
            Just(Verbosity::Silent),
            Just(Verbosity::Error),
            Just(Verbosity::Warn),
            Just(Verbosity::Info),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_slow_statement_routing(
            threshold_ms in 0u64..50,
            failed in any::<bool>(),
            verbosity in verbosity_strategy(),
        ) {
            let config = QueryConfig::new()
                .slow_threshold(Duration::from_millis(threshold_ms))
                .verbosity(verbosity);
            let (queries, sink) = interceptor(config);
            let deadlock: &(dyn StdError + 'static) = &Deadlock;
            let error = failed.then_some(deadlock);

            queries.trace(
                &RequestContext::new(),
                ago(threshold_ms + 100),
                || ("SELECT * FROM users".into(), 1),
                error,
            );

            let expected = match (failed, verbosity) {
                (_, Verbosity::Silent) => None,
                (true, _) => Some(Severity::Error),
                (false, Verbosity::Error) => None,
                (false, _) => Some(Severity::Warn),
            };
            let records = sink.records();
            prop_assert_eq!(records.first().map(|r| r.severity), expected);
            prop_assert!(records.len() <= 1);
            if let Some(event) = records.first().and_then(|r| r.event.as_query()) {
                prop_assert!(event.slow);
                prop_assert_eq!(event.error.is_some(), failed);
            }
        }
    }
}
