mod common;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use common::{issue, request, test_app};
use radius_auth::{
    config::AuditConfig,
    models::{AuditEvent, AuditEventKind, RequestContext, ScopeProperties, Severity},
    services::{audit::context, AuditSink, AuditTrail, MemoryAuditSink},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

fn request_context(request_id: &str) -> RequestContext {
    RequestContext {
        request_id: request_id.to_string(),
        method: "POST".to_string(),
        path: "/users".to_string(),
        query_string: String::new(),
        user_agent: "audit-test".to_string(),
        ip_address: "192.0.2.10".to_string(),
        user_id: None,
        username: None,
        roles: None,
        timestamp: Utc::now(),
    }
}

struct SlowSink;

#[async_trait]
impl AuditSink for SlowSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(), anyhow::Error> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_api_request_event_carries_authenticated_context() {
    let app = test_app();
    let record = issue(&app.jwt, "noc-1", &["NOC"], &[]);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/me?verbose=1")
                .header("authorization", format!("Bearer {}", record.token))
                .header("x-request-id", "req-audit-1")
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .header("user-agent", "radius-console/2.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = app.sink.events();
    let api = events
        .iter()
        .find(|e| e.event_kind == AuditEventKind::ApiRequest)
        .unwrap();

    assert_eq!(api.severity, Severity::Information);
    assert_eq!(api.actor_id.as_deref(), Some("noc-1"));
    let ctx = api.request_context.request().unwrap();
    assert_eq!(ctx.request_id, "req-audit-1");
    assert_eq!(ctx.method, "GET");
    assert_eq!(ctx.path, "/auth/me");
    assert_eq!(ctx.query_string, "verbose=1");
    assert_eq!(ctx.ip_address, "203.0.113.7");
    assert_eq!(ctx.user_agent, "radius-console/2.1");
    assert_eq!(ctx.user_id.as_deref(), Some("noc-1"));
    assert_eq!(ctx.username.as_deref(), Some("noc-1-name"));
    assert_eq!(ctx.roles, Some(vec!["NOC".to_string()]));

    let detail = api.detail.as_ref().unwrap();
    assert_eq!(detail["statusCode"], 200);
    assert_eq!(detail["method"], "GET");
}

#[tokio::test]
async fn test_client_errors_are_recorded_as_warnings() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/auth/me", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let events = app.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_kind, AuditEventKind::ApiRequest);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].actor_id, None);
    assert_eq!(events[0].request_context.user_id(), None);
}

#[tokio::test]
async fn test_event_outside_request_is_background() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditTrail::with_sink(sink.clone());

    audit
        .business_event("service_started", Some(json!({ "service": "radius-auth" })))
        .await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].request_context.request().is_none());
    assert_eq!(events[0].actor_id, None);
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_own_context() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditTrail::with_sink(sink.clone());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let audit = audit.clone();
            tokio::spawn(async move {
                let id = format!("req-{}", i);
                context::scope(request_context(&id), async move {
                    tokio::task::yield_now().await;
                    audit
                        .user_action("ping", Some(json!({ "expected": id })))
                        .await;
                })
                .await;
            })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    let events = sink.events();
    assert_eq!(events.len(), 16);
    for event in events {
        let ctx = event.request_context.request().unwrap();
        assert_eq!(event.detail.unwrap()["expected"], ctx.request_id);
    }
}

#[tokio::test]
async fn test_operation_scope_is_released_on_error() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditTrail::with_sink(sink.clone());

    let result: Result<(), &str> = audit
        .in_operation(
            "bulk_import",
            ScopeProperties::new().with("batch", 7),
            async {
                audit.user_action("import_row", None).await;
                Err("row 3 is invalid")
            },
        )
        .await;
    assert!(result.is_err());

    audit.user_action("after_import", None).await;

    let events = sink.events();
    assert_eq!(events.len(), 2);
    let inside = events[0].operation().unwrap();
    assert_eq!(inside.name, "bulk_import");
    assert_eq!(inside.properties.get("batch"), Some(&json!(7)));
    assert!(events[1].operations.is_empty());
}

#[tokio::test]
async fn test_nested_operations_are_ordered_outermost_first() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditTrail::with_sink(sink.clone());

    audit
        .in_operation("outer", ScopeProperties::new(), async {
            audit
                .in_operation("inner", ScopeProperties::new(), async {
                    audit.business_event("nested", None).await;
                })
                .await;
            audit.business_event("outer_only", None).await;
        })
        .await;

    let events = sink.events();
    let names: Vec<_> = events[0].operations.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["outer", "inner"]);
    assert_eq!(events[1].operation().unwrap().name, "outer");
}

#[tokio::test]
async fn test_failing_sink_never_breaks_the_request() {
    let app = test_app();
    let record = issue(&app.jwt, "user-1", &["User"], &[]);
    app.sink.set_failing(true);

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/auth/logout", Some(&record.token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.sink.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_sink_is_abandoned_after_timeout() {
    let config = AuditConfig {
        sink_timeout: Duration::from_millis(50),
        ..AuditConfig::default()
    };
    let audit = AuditTrail::new(Arc::new(SlowSink), &config);

    let started = tokio::time::Instant::now();
    audit.user_action("slow", None).await;

    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_error_event_lists_causes() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditTrail::with_sink(sink.clone());

    let err = anyhow::anyhow!("connection refused").context("blacklist lookup failed");
    let boxed: Box<dyn std::error::Error + Send + Sync> = err.into();
    audit.error(boxed.as_ref(), Some(json!({ "component": "blacklist" }))).await;

    let events = sink.events();
    assert_eq!(events[0].event_kind, AuditEventKind::Error);
    assert_eq!(events[0].severity, Severity::Error);
    assert_eq!(events[0].description, "blacklist lookup failed");
    let detail = events[0].detail.as_ref().unwrap();
    assert_eq!(detail["component"], "blacklist");
    assert_eq!(detail["causes"], json!(["connection refused"]));
}

#[tokio::test]
async fn test_performance_metric_severity_follows_duration() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditTrail::with_sink(sink.clone());

    audit
        .performance_metric("fast_query", Duration::from_millis(5), true, None)
        .await;
    audit
        .performance_metric("slow_query", Duration::from_millis(1500), true, None)
        .await;

    let events = sink.events();
    assert_eq!(events[0].severity, Severity::Information);
    assert_eq!(events[1].severity, Severity::Warning);
    assert_eq!(events[1].detail.as_ref().unwrap()["durationMs"], 1500);
}
