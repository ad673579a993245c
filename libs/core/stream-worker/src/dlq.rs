//! Dead Letter Queue (DLQ) management
//!
//! Holds entries that failed permanently or exhausted their retries.

use crate::error::{ErrorCategory, StreamError};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::info;

type StreamEntries = Vec<(String, Vec<(String, String)>)>;

/// Dead Letter Queue manager
#[derive(Clone)]
pub struct DlqManager {
    redis: ConnectionManager,
    dlq_stream: String,
    max_length: i64,
}

impl DlqManager {
    /// Create a new DlqManager
    pub fn new(redis: ConnectionManager, dlq_stream: impl Into<String>) -> Self {
        Self {
            redis,
            dlq_stream: dlq_stream.into(),
            max_length: 10_000,
        }
    }

    /// Set the maximum DLQ length
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Get the DLQ stream name
    pub fn dlq_stream(&self) -> &str {
        &self.dlq_stream
    }

    /// Append an entry to the dead letter stream
    pub async fn move_to_dlq(&self, entry: &DlqEntry) -> Result<String, StreamError> {
        let data = serde_json::to_string(entry)?;
        let mut conn = self.redis.clone();

        let dlq_id: String = redis::cmd("XADD")
            .arg(&self.dlq_stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg("data")
            .arg(&data)
            .query_async(&mut conn)
            .await?;

        info!(
            original_stream_id = %entry.original_stream_id,
            dlq_id = %dlq_id,
            error = %entry.error,
            attempts = entry.attempts,
            "Moved job to DLQ"
        );

        Ok(dlq_id)
    }

    /// List DLQ entries, oldest first
    pub async fn list(&self, count: usize) -> Result<Vec<DlqEntry>, StreamError> {
        let mut conn = self.redis.clone();

        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(&self.dlq_stream)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut results = Vec::new();

        for (_id, fields) in entries {
            if let Some(data) = fields.iter().find(|(k, _)| k == "data").map(|(_, v)| v)
                && let Ok(entry) = serde_json::from_str::<DlqEntry>(data)
            {
                results.push(entry);
            }
        }

        Ok(results)
    }
}

/// DLQ entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Original stream entry ID
    pub original_stream_id: String,

    /// Raw `job` payload, if the entry had one
    pub payload: Option<String>,

    /// Error message that caused the failure
    pub error: String,

    /// "transient" or "permanent"
    pub category: String,

    /// Number of processing attempts made
    pub attempts: u32,

    /// When the job was moved to DLQ
    pub failed_at: DateTime<Utc>,
}

impl DlqEntry {
    pub fn new(
        original_stream_id: impl Into<String>,
        payload: Option<String>,
        error: impl Into<String>,
        category: ErrorCategory,
        attempts: u32,
    ) -> Self {
        Self {
            original_stream_id: original_stream_id.into(),
            payload,
            error: error.into(),
            category: category.to_string(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlq_entry_serialization() {
        let entry = DlqEntry::new(
            "1234567890123-0",
            Some(r#"{"test":"data"}"#.to_string()),
            "Test error",
            ErrorCategory::Permanent,
            1,
        );

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: DlqEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, entry);
        assert_eq!(deserialized.category, "permanent");
    }
}
