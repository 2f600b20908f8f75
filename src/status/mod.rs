//! Status publishing for in-flight operations
//!
//! Every deploy produces a status key `<instance_id>:<operation>`. The
//! environment controller and the job watchers publish phase transitions
//! against that key; the HTTP layer reads them back for `last_operation`.
//!
//! Records follow two rules:
//! - the log only grows; every publish appends its description
//! - `succeeded` and `failed` are terminal; a later publish is still logged
//!   but does not move the phase

mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreError};

/// How long a status record lives after its last write
pub const STATUS_TTL: Duration = Duration::from_secs(20 * 60);

/// Build the status key for an operation on an instance
pub fn status_key(instance_id: &str, operation: &str) -> String {
    format!("{instance_id}:{operation}")
}

/// Phase of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Still running
    #[serde(rename = "in progress")]
    InProgress,
    /// Finished with an error
    #[serde(rename = "failed")]
    Failed,
    /// Finished successfully
    #[serde(rename = "succeeded")]
    Succeeded,
}

impl Phase {
    /// Whether no further transition is allowed
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Failed | Phase::Succeeded)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::InProgress => write!(f, "in progress"),
            Phase::Failed => write!(f, "failed"),
            Phase::Succeeded => write!(f, "succeeded"),
        }
    }
}

/// Stored record for one status key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current phase
    pub phase: Phase,
    /// Latest description
    pub description: String,
    /// Every description published since the key was created
    pub log: Vec<String>,
    /// When the first publish for this key happened
    pub started: DateTime<Utc>,
}

impl StatusRecord {
    fn new(phase: Phase, description: &str) -> Self {
        Self {
            phase,
            description: description.to_string(),
            log: vec![description.to_string()],
            started: Utc::now(),
        }
    }

    /// Apply a publish to this record
    fn apply(&mut self, phase: Phase, description: &str) {
        self.log.push(description.to_string());
        if self.phase.is_terminal() {
            return;
        }
        self.phase = phase;
        self.description = description.to_string();
    }
}

/// Records state transitions for status keys
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Record a transition for `key`
    async fn publish(&self, key: &str, phase: Phase, description: &str) -> Result<(), StoreError>;

    /// Forget everything recorded for `key`
    async fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// Publisher that only emits log lines
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl StatusPublisher for LogPublisher {
    async fn publish(&self, key: &str, phase: Phase, description: &str) -> Result<(), StoreError> {
        match phase {
            Phase::Failed => tracing::warn!(key = %key, phase = %phase, description = %description, "status"),
            _ => tracing::info!(key = %key, phase = %phase, description = %description, "status"),
        }
        Ok(())
    }

    async fn clear(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Publisher that persists records in a key-value store
pub struct DurablePublisher {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl DurablePublisher {
    /// Create a publisher over `store` with the standard TTL
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, STATUS_TTL)
    }

    /// Create a publisher over `store` with a custom TTL
    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the current record for `key`
    pub async fn get(&self, key: &str) -> Result<Option<StatusRecord>, StoreError> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StatusPublisher for DurablePublisher {
    async fn publish(&self, key: &str, phase: Phase, description: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let record = match self.get(key).await? {
            Some(mut existing) => {
                existing.apply(phase, description);
                existing
            }
            None => StatusRecord::new(phase, description),
        };
        let raw = serde_json::to_string(&record)?;
        self.store.set(key, raw, self.ttl).await
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(key).await
    }
}

/// Publisher that fans out to a log sink and a durable sink
///
/// Only the durable sink's result is returned; a failing log sink is
/// reported and otherwise ignored.
pub struct MultiPublisher {
    log: Arc<dyn StatusPublisher>,
    durable: Arc<dyn StatusPublisher>,
}

impl MultiPublisher {
    /// Create a fan-out publisher
    pub fn new(log: Arc<dyn StatusPublisher>, durable: Arc<dyn StatusPublisher>) -> Self {
        Self { log, durable }
    }
}

#[async_trait]
impl StatusPublisher for MultiPublisher {
    async fn publish(&self, key: &str, phase: Phase, description: &str) -> Result<(), StoreError> {
        if let Err(e) = self.log.publish(key, phase, description).await {
            tracing::error!(key = %key, error = %e, "log status publisher failed");
        }
        self.durable.publish(key, phase, description).await
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        if let Err(e) = self.log.clear(key).await {
            tracing::error!(key = %key, error = %e, "log status publisher failed to clear");
        }
        self.durable.clear(key).await
    }
}

/// Publish and log (rather than propagate) a failure to record status
///
/// Background tasks have nobody to return a publish error to.
pub async fn publish_or_log(
    publisher: &dyn StatusPublisher,
    key: &str,
    phase: Phase,
    description: &str,
) {
    if let Err(e) = publisher.publish(key, phase, description).await {
        tracing::error!(key = %key, error = %e, "failed to publish status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durable() -> DurablePublisher {
        DurablePublisher::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn status_key_joins_instance_and_operation() {
        assert_eq!(status_key("test:cloudapp", "provision"), "test:cloudapp:provision");
    }

    #[test]
    fn phase_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::InProgress).unwrap(), "\"in progress\"");
        assert_eq!(serde_json::to_string(&Phase::Failed).unwrap(), "\"failed\"");
        assert_eq!(serde_json::to_string(&Phase::Succeeded).unwrap(), "\"succeeded\"");
        assert!(!Phase::InProgress.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Succeeded.is_terminal());
    }

    #[tokio::test]
    async fn first_publish_creates_record() {
        let p = durable();
        p.publish("k", Phase::InProgress, "starting").await.unwrap();

        let rec = p.get("k").await.unwrap().unwrap();
        assert_eq!(rec.phase, Phase::InProgress);
        assert_eq!(rec.description, "starting");
        assert_eq!(rec.log, vec!["starting"]);
    }

    #[tokio::test]
    async fn log_is_append_only() {
        let p = durable();
        p.publish("k", Phase::InProgress, "one").await.unwrap();
        p.publish("k", Phase::InProgress, "two").await.unwrap();
        p.publish("k", Phase::Succeeded, "done").await.unwrap();

        let rec = p.get("k").await.unwrap().unwrap();
        assert_eq!(rec.log, vec!["one", "two", "done"]);
        assert_eq!(rec.phase, Phase::Succeeded);
        assert_eq!(rec.description, "done");
    }

    #[tokio::test]
    async fn terminal_phase_is_sticky() {
        let p = durable();
        p.publish("k", Phase::Failed, "job failed").await.unwrap();
        p.publish("k", Phase::InProgress, "late progress").await.unwrap();
        p.publish("k", Phase::Succeeded, "late success").await.unwrap();

        let rec = p.get("k").await.unwrap().unwrap();
        assert_eq!(rec.phase, Phase::Failed);
        assert_eq!(rec.description, "job failed");
        assert_eq!(rec.log.len(), 3);
    }

    #[tokio::test]
    async fn publish_after_clear_starts_fresh_log() {
        let p = durable();
        p.publish("k", Phase::Succeeded, "old run").await.unwrap();
        p.clear("k").await.unwrap();
        assert!(p.get("k").await.unwrap().is_none());

        p.publish("k", Phase::InProgress, "new run").await.unwrap();
        let rec = p.get("k").await.unwrap().unwrap();
        assert_eq!(rec.phase, Phase::InProgress);
        assert_eq!(rec.log, vec!["new run"]);
    }

    #[tokio::test]
    async fn records_expire_with_ttl() {
        let p = DurablePublisher::with_ttl(Arc::new(MemoryStore::new()), Duration::ZERO);
        p.publish("k", Phase::InProgress, "x").await.unwrap();
        assert!(p.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn multi_publisher_ignores_log_failures() {
        let mut log = MockStatusPublisher::new();
        log.expect_publish()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Backend("log sink down".into())));

        let durable = Arc::new(durable());
        let multi = MultiPublisher::new(Arc::new(log), durable.clone());
        multi.publish("k", Phase::Succeeded, "ok").await.unwrap();

        assert_eq!(durable.get("k").await.unwrap().unwrap().phase, Phase::Succeeded);
    }

    #[tokio::test]
    async fn multi_publisher_surfaces_durable_failures() {
        let mut failing = MockStatusPublisher::new();
        failing
            .expect_publish()
            .returning(|_, _, _| Err(StoreError::Backend("redis down".into())));

        let multi = MultiPublisher::new(Arc::new(LogPublisher), Arc::new(failing));
        assert!(multi.publish("k", Phase::InProgress, "x").await.is_err());
    }
}
