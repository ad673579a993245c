//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the stream worker.

use crate::registry::StreamDef;
use uuid::Uuid;

/// Configuration for the stream worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis stream name
    pub stream_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Dead letter queue stream name
    pub dlq_stream: String,

    /// Maximum DLQ length before trimming
    pub dlq_max_length: i64,

    /// Batch size for reading messages
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds (None = non-blocking)
    pub block_timeout_ms: Option<u64>,

    /// Poll interval when reads are non-blocking
    pub poll_interval_ms: u64,

    /// Retries allowed for transient failures before dead-lettering
    pub max_retries: u32,

    /// Entries idle longer than this in other consumers are claimed, at startup
    /// and then once per interval of the same length
    pub claim_idle_ms: u64,
}

impl WorkerConfig {
    /// Create a new WorkerConfig from a StreamDef
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self {
            stream_name: S::STREAM_NAME.to_string(),
            consumer_group: S::CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream: S::DLQ_STREAM.to_string(),
            dlq_max_length: 10_000,
            batch_size: S::BATCH_SIZE,
            block_timeout_ms: Some(S::BLOCK_TIMEOUT_MS),
            poll_interval_ms: 1000,
            max_retries: 3,
            claim_idle_ms: 60_000,
        }
    }

    /// Create a new WorkerConfig with explicit values
    pub fn new(stream_name: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        let stream_name = stream_name.into();
        let domain = stream_name.split(':').next().unwrap_or("stream").to_string();

        Self {
            stream_name,
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dlq_stream: format!("{}:dlq", domain),
            dlq_max_length: 10_000,
            batch_size: 10,
            block_timeout_ms: Some(5000),
            poll_interval_ms: 1000,
            max_retries: 3,
            claim_idle_ms: 60_000,
        }
    }

    /// Set the consumer ID
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the blocking timeout (None for non-blocking)
    pub fn with_blocking(mut self, timeout_ms: Option<u64>) -> Self {
        self.block_timeout_ms = timeout_ms;
        self
    }

    /// Set the retry budget for transient failures
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the idle time after which other consumers' entries are claimed
    pub fn with_claim_idle_ms(mut self, idle_ms: u64) -> Self {
        self.claim_idle_ms = idle_ms;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.block_timeout_ms.is_some()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("stream:jobs", "workers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestStream;

    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:stream";
        const CONSUMER_GROUP: &'static str = "test:group";
        const DLQ_STREAM: &'static str = "test:dlq";
        const BATCH_SIZE: usize = 25;
    }

    #[test]
    fn test_from_stream_def() {
        let config = WorkerConfig::from_stream_def::<TestStream>();

        assert_eq!(config.stream_name, "test:stream");
        assert_eq!(config.consumer_group, "test:group");
        assert_eq!(config.dlq_stream, "test:dlq");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.block_timeout_ms, Some(5_000));
        assert_eq!(config.max_retries, 3);
        assert!(config.consumer_id.starts_with("worker-"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = WorkerConfig::new("my:stream", "my:group")
            .with_consumer_id("worker-1")
            .with_batch_size(0)
            .with_max_retries(5)
            .with_blocking(None);

        assert_eq!(config.stream_name, "my:stream");
        assert_eq!(config.dlq_stream, "my:dlq");
        assert_eq!(config.consumer_id, "worker-1");
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_retries, 5);
        assert!(!config.is_blocking());
    }
}
