//! Delivery record persistence.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{DeliveryKey, DeliveryRecord};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Default Redis key prefix for delivery records.
pub const DEFAULT_RECORD_PREFIX: &str = "notification:record";

/// Key-value storage for delivery records. Holds no business logic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record for `key`, if any.
    async fn get_by_id(&self, key: &DeliveryKey) -> NotificationResult<Option<DeliveryRecord>>;

    /// Create or replace a record.
    async fn upsert(&self, record: &DeliveryRecord) -> NotificationResult<()>;

    /// Replace an existing record; fails with `RecordNotFound` if absent.
    async fn update(&self, record: &DeliveryRecord) -> NotificationResult<()>;
}

/// Records stored as JSON strings under `<prefix>:<key>`, without expiry.
#[derive(Clone)]
pub struct RedisRecordStore {
    redis: ConnectionManager,
    prefix: String,
}

impl RedisRecordStore {
    pub fn new(redis: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &DeliveryKey) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn get_by_id(&self, key: &DeliveryKey) -> NotificationResult<Option<DeliveryRecord>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.redis_key(key))
            .query_async(&mut conn)
            .await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(NotificationError::from)
    }

    async fn upsert(&self, record: &DeliveryRecord) -> NotificationResult<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(record)?;

        let _: () = redis::cmd("SET")
            .arg(self.redis_key(&record.key))
            .arg(json)
            .query_async(&mut conn)
            .await?;

        debug!(delivery_key = %record.key, sent = record.sent, "Delivery record upserted");
        Ok(())
    }

    async fn update(&self, record: &DeliveryRecord) -> NotificationResult<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(record)?;

        // SET XX replies nil when the key does not exist
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.redis_key(&record.key))
            .arg(json)
            .arg("XX")
            .query_async(&mut conn)
            .await?;

        if reply.is_none() {
            return Err(NotificationError::RecordNotFound(record.key.to_string()));
        }

        debug!(delivery_key = %record.key, sent = record.sent, "Delivery record updated");
        Ok(())
    }
}

/// Process-local store for tests and single-instance local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<DeliveryKey, DeliveryRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_by_id(&self, key: &DeliveryKey) -> NotificationResult<Option<DeliveryRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn upsert(&self, record: &DeliveryRecord) -> NotificationResult<()> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &DeliveryRecord) -> NotificationResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.key) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(NotificationError::RecordNotFound(record.key.to_string())),
        }
    }
}
