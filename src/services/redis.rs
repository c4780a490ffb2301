//! Shared ephemeral store: revocation markers and the profile cache.
//!
//! The validator and auth service hold `Arc<dyn EphemeralStore>` handles so
//! tests can substitute the in-memory implementation with deterministic TTLs.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key for a presence-only revocation marker.
pub fn revocation_key(jti: &str) -> String {
    format!("revoked_token:{}", jti)
}

/// Key for a cached profile snapshot.
pub fn profile_cache_key(subject: &str) -> String {
    format!("user_auth:{}", subject)
}

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Set a key with a TTL. A single atomic put; there is no multi-step
    /// mutation anywhere in this subsystem.
    async fn put(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    /// Presence check. Absence is only meaningful because the caller actively
    /// queried; it is never inferred.
    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically.
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
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn put(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set key: {}", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get key: {}", e))
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check key: {}", e))?;
        Ok(exists)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory store with real TTL behavior and operation counters, used by
/// tests to assert which state the validator consulted.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    pub puts: AtomicUsize,
    pub reads: AtomicUsize,
    /// When set, every put fails. Exercises the best-effort cache-write path.
    pub fail_puts: std::sync::atomic::AtomicBool,
    /// When set, every get and exists fails. Exercises the fail-closed path
    /// for an unreachable store.
    pub fail_reads: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store mutex poisoned: {}", e))
    }

    /// Remaining TTL of a live key, in whole seconds.
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        let entries = self.entries.lock().ok()?;
        let (_, deadline) = entries.get(key)?;
        deadline
            .checked_duration_since(Instant::now())
            .map(|d| d.as_secs())
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("put failed"));
        }
        let deadline = Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64);
        self.lock()?.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("read failed"));
        }
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("read failed"));
        }
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, deadline)) if *deadline > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
