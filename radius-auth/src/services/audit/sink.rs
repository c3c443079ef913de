use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::{AuditEvent, Severity};

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), anyhow::Error>;
}

/// Writes every event as a structured `tracing` event under target `audit`.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        let payload = serde_json::to_string(event)?;
        let kind = event.event_kind.as_str();
        let actor_id = event.actor_id.as_deref().unwrap_or("-");

        match event.severity {
            Severity::Information => tracing::info!(
                target: "audit",
                event_id = %event.event_id,
                event_kind = kind,
                actor_id,
                payload = %payload,
                "{}",
                event.description
            ),
            Severity::Warning => tracing::warn!(
                target: "audit",
                event_id = %event.event_id,
                event_kind = kind,
                actor_id,
                payload = %payload,
                "{}",
                event.description
            ),
            Severity::Error => tracing::error!(
                target: "audit",
                event_id = %event.event_id,
                event_kind = kind,
                actor_id,
                payload = %payload,
                "{}",
                event.description
            ),
        }
        Ok(())
    }
}

/// Keeps the newest events in a capped Redis list.
#[derive(Clone)]
pub struct RedisAuditSink {
    manager: ConnectionManager,
    key: String,
    max_events: usize,
}

impl RedisAuditSink {
    pub fn new(manager: ConnectionManager, key: impl Into<String>, max_events: usize) -> Self {
        Self {
            manager,
            key: key.into(),
            max_events: max_events.max(1),
        }
    }
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.manager.clone();

        redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(&self.key)
            .arg(payload)
            .ignore()
            .cmd("LTRIM")
            .arg(&self.key)
            .arg(0)
            .arg(self.max_events as i64 - 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write audit event: {}", e))
    }
}

/// Captures events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Make every `record` call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), anyhow::Error> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory audit sink is failing");
        }
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("Audit sink mutex poisoned: {}", e))?
            .push(event.clone());
        Ok(())
    }
}
