//! Audit trail for security, business and performance events.
//!
//! Every event carries a snapshot of the ambient request context taken at the
//! moment it is recorded, plus the stack of operation scopes it was recorded
//! in. Sink failures never reach the caller: they are reported through
//! `tracing` and dropped.

pub mod context;
pub mod sink;

use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::AuditConfig;
use crate::models::{
    AuditEvent, AuditEventKind, ContextSnapshot, OperationFrame, ScopeProperties,
    SecurityEventType, Severity,
};

pub use sink::{AuditSink, MemoryAuditSink, RedisAuditSink, TracingAuditSink};

#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    sink_timeout: Duration,
    slow_operation_threshold: Duration,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> Self {
        Self {
            sink,
            sink_timeout: config.sink_timeout,
            slow_operation_threshold: config.slow_operation_threshold,
        }
    }

    /// Audit trail with default timeouts and thresholds.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self::new(sink, &AuditConfig::default())
    }

    pub fn slow_operation_threshold(&self) -> Duration {
        self.slow_operation_threshold
    }

    pub async fn user_action(&self, action: &str, detail: Option<Value>) {
        self.emit(
            AuditEventKind::UserAction,
            Severity::Information,
            format!("User action: {}", action),
            with_fields(detail, [("action", json!(action))]),
        )
        .await;
    }

    pub async fn security_event(
        &self,
        event_type: SecurityEventType,
        description: impl Into<String>,
        detail: Option<Value>,
    ) {
        self.emit(
            AuditEventKind::SecurityEvent,
            event_type.severity(),
            description.into(),
            with_fields(detail, [("securityEventType", json!(event_type.as_str()))]),
        )
        .await;
    }

    pub async fn performance_metric(
        &self,
        operation: &str,
        duration: Duration,
        success: bool,
        detail: Option<Value>,
    ) {
        let event = self.performance_event(
            operation,
            duration,
            success,
            detail,
            context::current_snapshot(),
            context::current_operations(),
        );
        self.dispatch(event).await;
    }

    pub async fn api_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        self.emit(
            AuditEventKind::ApiRequest,
            Severity::for_status(status),
            format!("{} {} responded {}", method, path, status),
            Some(json!({
                "method": method,
                "path": path,
                "statusCode": status,
                "durationMs": duration.as_millis() as u64,
            })),
        )
        .await;
    }

    pub async fn error(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        detail: Option<Value>,
    ) {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        self.emit(
            AuditEventKind::Error,
            Severity::Error,
            error.to_string(),
            with_fields(detail, [("causes", json!(chain))]),
        )
        .await;
    }

    pub async fn business_event(&self, name: &str, detail: Option<Value>) {
        self.emit(
            AuditEventKind::BusinessEvent,
            Severity::Information,
            name.to_string(),
            detail,
        )
        .await;
    }

    /// Run `fut` inside a named operation scope.
    ///
    /// Events recorded while `fut` runs carry the scope's id, start time and
    /// properties. The scope is released however `fut` ends.
    pub async fn in_operation<F>(
        &self,
        name: &str,
        properties: ScopeProperties,
        fut: F,
    ) -> F::Output
    where
        F: Future,
    {
        let frame = OperationFrame::new(name, properties);
        let span = tracing::info_span!(
            "operation",
            operation = %frame.name,
            operation_id = %frame.operation_id
        );
        context::with_operation(frame, fut).instrument(span).await
    }

    /// Start timing `operation`. Finish the timer to record success; dropping
    /// it unfinished records a failure.
    pub fn performance_timer(&self, operation: impl Into<String>) -> PerformanceTimer {
        PerformanceTimer {
            trail: self.clone(),
            operation: operation.into(),
            started: Instant::now(),
            snapshot: context::current_snapshot(),
            operations: context::current_operations(),
            finished: false,
        }
    }

    async fn emit(
        &self,
        kind: AuditEventKind,
        severity: Severity,
        description: String,
        detail: Option<Value>,
    ) {
        let event = AuditEvent::new(
            kind,
            severity,
            description,
            detail,
            context::current_snapshot(),
            context::current_operations(),
        );
        self.dispatch(event).await;
    }

    fn performance_event(
        &self,
        operation: &str,
        duration: Duration,
        success: bool,
        detail: Option<Value>,
        snapshot: ContextSnapshot,
        operations: Vec<OperationFrame>,
    ) -> AuditEvent {
        let duration_ms = duration.as_millis() as u64;
        let severity =
            Severity::for_duration(duration_ms, self.slow_operation_threshold.as_millis() as u64);
        AuditEvent::new(
            AuditEventKind::PerformanceMetric,
            severity,
            format!("{} took {} ms", operation, duration_ms),
            with_fields(
                detail,
                [
                    ("operation", json!(operation)),
                    ("durationMs", json!(duration_ms)),
                    ("success", json!(success)),
                ],
            ),
            snapshot,
            operations,
        )
    }

    /// Hand `event` to the sink. Never fails.
    pub async fn dispatch(&self, event: AuditEvent) {
        match tokio::time::timeout(self.sink_timeout, self.sink.record(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => fallback(&event, &e.to_string()),
            Err(_) => fallback(
                &event,
                &format!("sink did not answer within {:?}", self.sink_timeout),
            ),
        }
    }
}

fn fallback(event: &AuditEvent, reason: &str) {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| event.description.clone());
    tracing::error!(
        target: "audit",
        event_id = %event.event_id,
        event_kind = event.event_kind.as_str(),
        error = %reason,
        payload = %payload,
        "Failed to write audit event"
    );
}

/// Merge `fields` into `detail`. A non-object detail is kept under `data`.
fn with_fields<const N: usize>(detail: Option<Value>, fields: [(&str, Value); N]) -> Option<Value> {
    let mut map = match detail {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
        None => Map::new(),
    };
    for (key, value) in fields {
        map.entry(key.to_string()).or_insert(value);
    }
    Some(Value::Object(map))
}

/// Guard returned by [`AuditTrail::performance_timer`].
pub struct PerformanceTimer {
    trail: AuditTrail,
    operation: String,
    started: Instant,
    snapshot: ContextSnapshot,
    operations: Vec<OperationFrame>,
    finished: bool,
}

impl PerformanceTimer {
    pub async fn finish(mut self, success: bool) {
        self.finished = true;
        let event = self.build(success);
        self.trail.dispatch(event).await;
    }

    fn build(&self, success: bool) -> AuditEvent {
        self.trail.performance_event(
            &self.operation,
            self.started.elapsed(),
            success,
            None,
            self.snapshot.clone(),
            self.operations.clone(),
        )
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let event = self.build(false);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let trail = self.trail.clone();
                handle.spawn(async move { trail.dispatch(event).await });
            }
            Err(_) => fallback(&event, "no runtime to record the event on"),
        }
    }
}
