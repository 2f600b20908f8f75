//! Key-value stores backing the durable status publisher
//!
//! Two backends: an in-process store with per-entry expiry, used when no
//! Redis host is configured and in tests, and a Redis store that relies on
//! `SET EX` for expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors from a status store backend
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend could not be reached or rejected the command
    #[error("status store backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded
    #[error("status record serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// String key-value store with per-key expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; expired keys read as absent
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value that expires `ttl` after this write
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| now < e.expires_at);
    }

    /// Number of entries, including ones that expired but were not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.cleanup_expired();
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis at `host:port`, authenticating when a password is given
    pub async fn connect(host: &str, port: u16, password: Option<&str>) -> Result<Self, StoreError> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host.to_string(), port),
            redis: redis::RedisConnectionInfo {
                password: password.filter(|p| !p.is_empty()).map(str::to_string),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!(host = %host, port, "Connected to redis status store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
