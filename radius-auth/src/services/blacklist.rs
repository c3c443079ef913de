use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::BlacklistError;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Revocation store keyed by token identifier (`jti`).
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Mark a token revoked for `ttl_seconds`, after which the entry may vanish.
    async fn blacklist_token(&self, token_jti: &str, ttl_seconds: u64)
        -> Result<(), BlacklistError>;
    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, BlacklistError>;
    /// Drop entries whose TTL has elapsed. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, BlacklistError>;
    async fn health_check(&self) -> Result<(), BlacklistError>;
}

#[derive(Clone)]
pub struct RedisBlacklist {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisBlacklist {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    fn key(token_jti: &str) -> String {
        format!("blacklist:{}", token_jti)
    }
}

#[async_trait]
impl TokenBlacklist for RedisBlacklist {
    async fn blacklist_token(
        &self,
        token_jti: &str,
        ttl_seconds: u64,
    ) -> Result<(), BlacklistError> {
        let mut conn = self.manager.clone();

        // SET overwrites, so a second revocation with a longer TTL extends it.
        redis::cmd("SET")
            .arg(Self::key(token_jti))
            .arg("revoked")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, BlacklistError> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(token_jti))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn purge_expired(&self) -> Result<usize, BlacklistError> {
        // Redis expires keys natively.
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), BlacklistError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BlacklistError::Unavailable(format!("Redis health check failed: {}", e)))
    }
}

/// Process-local revocation store for single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryBlacklist {
    entries: DashMap<String, Instant>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodically purge expired entries until the handle is aborted.
    ///
    /// Intervals under a second are raised to one second.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, "Purged expired blacklist entries");
                }
            }
        })
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryBlacklist {
    async fn blacklist_token(
        &self,
        token_jti: &str,
        ttl_seconds: u64,
    ) -> Result<(), BlacklistError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds.max(1));
        self.entries
            .entry(token_jti.to_string())
            .and_modify(|existing| {
                if expires_at > *existing {
                    *existing = expires_at;
                }
            })
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, BlacklistError> {
        Ok(self
            .entries
            .get(token_jti)
            .map(|expires_at| *expires_at > Instant::now())
            .unwrap_or(false))
    }

    async fn purge_expired(&self) -> Result<usize, BlacklistError> {
        Ok(self.sweep(Instant::now()))
    }

    async fn health_check(&self) -> Result<(), BlacklistError> {
        Ok(())
    }
}

/// Test double with a switch that makes every call fail.
pub struct MockBlacklist {
    pub blacklisted_tokens: Mutex<HashSet<String>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl Default for MockBlacklist {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBlacklist {
    pub fn new() -> Self {
        Self {
            blacklisted_tokens: Mutex::new(HashSet::new()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every lookup, for exercising timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.delay.lock() {
            *guard = delay;
        }
    }

    async fn maybe_fail(&self) -> Result<(), BlacklistError> {
        let delay = self.delay.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BlacklistError::Unavailable(
                "mock blacklist is failing".to_string(),
            ));
        }
        Ok(())
    }

    fn tokens(&self) -> Result<std::sync::MutexGuard<'_, HashSet<String>>, BlacklistError> {
        self.blacklisted_tokens.lock().map_err(|e| {
            BlacklistError::Unavailable(format!("Mock blacklist mutex poisoned: {}", e))
        })
    }
}

#[async_trait]
impl TokenBlacklist for MockBlacklist {
    async fn blacklist_token(
        &self,
        token_jti: &str,
        _ttl_seconds: u64,
    ) -> Result<(), BlacklistError> {
        self.maybe_fail().await?;
        self.tokens()?.insert(token_jti.to_string());
        Ok(())
    }

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, BlacklistError> {
        self.maybe_fail().await?;
        Ok(self.tokens()?.contains(token_jti))
    }

    async fn purge_expired(&self) -> Result<usize, BlacklistError> {
        self.maybe_fail().await?;
        Ok(0)
    }

    async fn health_check(&self) -> Result<(), BlacklistError> {
        self.maybe_fail().await
    }
}
