//! Integration tests for tracewire
//!
//! These tests cover exchanges whose handlers issue database statements, so
//! the HTTP and database interceptors report through one sink.

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};
use tracewire::prelude::*;
use tracewire::{Operation, ReplayBody, TRUNCATION_MARKER};

type AppRequest = Request<ReplayBody<Full<Bytes>>>;

fn request(method: &str, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

async fn fetch_users() -> Result<Vec<&'static str>, RecordNotFound> {
    Ok(vec!["alice", "bob"])
}

async fn fetch_missing() -> Result<Vec<&'static str>, RecordNotFound> {
    Err(RecordNotFound)
}

// ============================================================================
// Correlation Tests
// ============================================================================

mod correlation_tests {
    use super::*;

    #[tokio::test]
    async fn test_query_events_share_the_exchange_id() {
        let sink = MemorySink::new();
        let queries = QueryInterceptor::with_sink(
            QueryConfig::new().verbosity(Verbosity::Info),
            sink.shared(),
        );

        let svc = RequestInterceptorLayer::with_sink(InterceptorConfig::new(), sink.shared())
            .layer(service_fn(move |req: AppRequest| {
                let queries = queries.clone();
                async move {
                    let ctx = req
                        .extensions()
                        .get::<RequestContext>()
                        .cloned()
                        .unwrap_or_default();
                    let users = queries
                        .instrument(&ctx, "SELECT * FROM users", fetch_users())
                        .await
                        .unwrap();
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(users.join(",")))))
                }
            }));

        let response = svc
            .oneshot(
                Request::builder()
                    .uri("/users")
                    .header("x-request-id", "corr-42")
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "corr-42");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"alice,bob");

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(events[0].as_received().is_some());
        assert!(events[2].as_completed().is_some());

        let query = events[1].as_query().unwrap();
        assert_eq!(query.operation, Operation::Select);
        assert_eq!(query.table, "users");
        assert_eq!(query.rows_affected, 2);
        assert!(!query.slow);
        assert!(query.caller.contains("integration_tests.rs"));

        assert!(events.iter().all(|e| e.request_id() == Some("corr-42")));
    }

    #[tokio::test]
    async fn test_record_not_found_stays_quiet() {
        let sink = MemorySink::new();
        let queries = QueryInterceptor::with_sink(
            QueryConfig::new().verbosity(Verbosity::Info),
            sink.shared(),
        );

        let svc = RequestInterceptorLayer::with_sink(
            InterceptorConfig::new().ignore_status(|status| status == StatusCode::NOT_FOUND),
            sink.shared(),
        )
        .layer(service_fn(move |req: AppRequest| {
            let queries = queries.clone();
            async move {
                let ctx = req
                    .extensions()
                    .get::<RequestContext>()
                    .cloned()
                    .unwrap_or_default();
                let status = match queries
                    .instrument(&ctx, "SELECT * FROM users WHERE id = 9", fetch_missing())
                    .await
                {
                    Ok(_) => StatusCode::OK,
                    Err(_) => StatusCode::NOT_FOUND,
                };
                let mut response = Response::new(Full::new(Bytes::from("{}")));
                *response.status_mut() = status;
                Ok::<_, Infallible>(response)
            }
        }));

        let response = svc.oneshot(request("GET", "/users/9", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        response.into_body().collect().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].event.as_received().is_some());
        assert!(records.iter().all(|r| r.severity != Severity::Error));
    }
}

// ============================================================================
// Failure Reporting Tests
// ============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_server_error_carries_masked_bodies_and_subject() {
        let sink = MemorySink::new();
        let config = InterceptorConfig::new().mask_patterns(["password", "token"]);

        let svc = RequestInterceptorLayer::with_sink(config, sink.shared()).layer(service_fn(
            |_req: AppRequest| async {
                let mut response = Response::new(Full::new(Bytes::from(
                    r#"{"error":"boom","token":"abc"}"#,
                )));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
                    .extensions_mut()
                    .insert(HandlerErrors::new().with("database unavailable"));
                response
                    .extensions_mut()
                    .insert(AuthenticatedSubject::new(7));
                Ok::<_, Infallible>(response)
            },
        ));

        let response = svc
            .oneshot(request(
                "POST",
                "/login",
                r#"{"user":"bob","password":"hunter2"}"#,
            ))
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();

        let records = sink.records();
        let last = records.last().unwrap();
        assert_eq!(last.severity, Severity::Error);

        let completed = last.event.as_completed().unwrap();
        assert_eq!(completed.status, 500);
        assert_eq!(completed.user_id.as_deref(), Some("7"));
        assert_eq!(completed.handler_errors, vec!["database unavailable"]);

        let request_body: serde_json::Value =
            serde_json::from_str(completed.request_body.as_deref().unwrap()).unwrap();
        assert_eq!(request_body["user"], "bob");
        assert_eq!(request_body["password"], tracewire::MASK);

        let response_body: serde_json::Value =
            serde_json::from_str(completed.response_body.as_deref().unwrap()).unwrap();
        assert_eq!(response_body["error"], "boom");
        assert_eq!(response_body["token"], tracewire::MASK);
    }

    #[tokio::test]
    async fn test_oversized_response_is_truncated() {
        let sink = MemorySink::new();
        let config = InterceptorConfig::new().max_body_size(16);

        let svc = RequestInterceptorLayer::with_sink(config, sink.shared()).layer(service_fn(
            |_req: AppRequest| async {
                let mut response = Response::new(Full::new(Bytes::from("x".repeat(64))));
                *response.status_mut() = StatusCode::BAD_REQUEST;
                Ok::<_, Infallible>(response)
            },
        ));

        let response = svc.oneshot(request("GET", "/big", "")).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), 64);

        let records = sink.records();
        let last = records.last().unwrap();
        assert_eq!(last.severity, Severity::Warn);

        let completed = last.event.as_completed().unwrap();
        assert_eq!(completed.response_size, Some(64));
        assert_eq!(
            completed.response_body.as_deref(),
            Some(format!("{}{}", "x".repeat(16), TRUNCATION_MARKER).as_str())
        );
    }

    #[tokio::test]
    async fn test_slow_statement_inside_exchange() {
        let sink = MemorySink::new();
        let queries = QueryInterceptor::with_sink(
            QueryConfig::new().slow_threshold(Duration::from_millis(5)),
            sink.shared(),
        );

        let svc = RequestInterceptorLayer::with_sink(
            InterceptorConfig::new().verbosity(Verbosity::Warn),
            sink.shared(),
        )
        .layer(service_fn(move |req: AppRequest| {
            let queries = queries.clone();
            async move {
                let ctx = req
                    .extensions()
                    .get::<RequestContext>()
                    .cloned()
                    .unwrap_or_default();
                queries
                    .instrument(&ctx, "UPDATE accounts SET balance = 0", async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<u64, RecordNotFound>(3)
                    })
                    .await
                    .unwrap();
                Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
            }
        }));

        let response = svc.oneshot(request("POST", "/accounts", "{}")).await.unwrap();
        response.into_body().collect().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Warn);

        let query = records[0].event.as_query().unwrap();
        assert!(query.slow);
        assert_eq!(query.operation, Operation::Update);
        assert_eq!(query.table, "accounts");
        assert_eq!(query.rows_affected, 3);
        assert!(query.context.request_id.is_some());
    }
}

// ============================================================================
// Skip Path Tests
// ============================================================================

mod skip_tests {
    use super::*;

    #[tokio::test]
    async fn test_skipped_path_is_invisible() {
        let sink = MemorySink::new();
        let svc = RequestInterceptorLayer::with_sink(
            InterceptorConfig::new().skip_path("/health"),
            sink.shared(),
        )
        .layer(service_fn(|req: AppRequest| async move {
            assert!(req.extensions().get::<RequestContext>().is_none());
            assert!(req.extensions().get::<RequestId>().is_none());
            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from("ok"))))
        }));

        let response = svc.oneshot(request("GET", "/health", "")).await.unwrap();
        assert!(response.headers().get("x-request-id").is_none());
        response.into_body().collect().await.unwrap();

        assert!(sink.is_empty());
    }
}
