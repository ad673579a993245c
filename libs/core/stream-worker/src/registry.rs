//! Stream registry types and definitions.
//!
//! This module provides:
//! - `StreamDef` trait for domain-specific stream definitions
//! - `StreamJob` marker for payload types
//! - `StreamProcessor` trait for the handler a worker drives
//! - `MessageKey` enum for standard message field keys

use crate::error::StreamError;
use crate::event::StreamEvent;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Standard message keys used in stream entries.
///
/// These are the field names producers write and the consumer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKey {
    /// The job/event payload (JSON serialized).
    Job,
    /// Correlation ID for request tracing.
    RequestId,
    /// Timestamp when the message was created.
    CreatedAt,
}

/// Stream definition trait.
///
/// Each domain implements this trait to define their stream configuration.
///
/// # Example
///
/// ```rust,ignore
/// use stream_worker::StreamDef;
///
/// pub struct NotificationStream;
///
/// impl StreamDef for NotificationStream {
///     const STREAM_NAME: &'static str = "notifications:requested";
///     const CONSUMER_GROUP: &'static str = "notification_workers";
///     const DLQ_STREAM: &'static str = "notifications:dlq";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The Redis stream name (e.g., "notifications:requested").
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// The dead letter queue stream name for failed jobs.
    const DLQ_STREAM: &'static str;

    /// Maximum stream length before auto-trim (MAXLEN).
    /// Default: 100,000 entries.
    const MAX_LENGTH: i64 = 100_000;

    /// Entries read per XREADGROUP call.
    const BATCH_SIZE: usize = 10;

    /// How long a blocking read waits for new entries.
    const BLOCK_TIMEOUT_MS: u64 = 5_000;

    /// Get the stream name.
    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    /// Get the consumer group name.
    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }

    /// Get the DLQ stream name.
    fn dlq_stream() -> &'static str {
        Self::DLQ_STREAM
    }
}

/// Payload carried in the `job` field of a stream entry.
///
/// Blanket-implemented for every serde type; retries never rewrite the
/// payload, so no retry bookkeeping lives on the job itself.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {}

impl<T> StreamJob for T where T: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {}

/// Trait for job processors.
///
/// Domain handlers implement this trait to process entries from the stream.
/// The worker acks on `Ok`, and uses the error's category to decide between
/// retrying and dead-lettering on `Err`.
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    /// Process a single stream event.
    async fn process(&self, event: &StreamEvent<J>) -> Result<(), StreamError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;

    /// Health check for the processor, run once at worker startup.
    ///
    /// Default: always returns Ok(true).
    async fn health_check(&self) -> Result<bool, StreamError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_key() {
        assert_eq!(MessageKey::Job.to_string(), "job");
        assert_eq!(MessageKey::RequestId.as_ref(), "request_id");
        assert_eq!("created_at".parse::<MessageKey>().unwrap(), MessageKey::CreatedAt);
    }

    struct TestStream;
    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:stream";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DLQ_STREAM: &'static str = "test:dlq";
    }

    #[test]
    fn test_stream_def() {
        assert_eq!(TestStream::stream_name(), "test:stream");
        assert_eq!(TestStream::consumer_group(), "test_workers");
        assert_eq!(TestStream::dlq_stream(), "test:dlq");
        assert_eq!(TestStream::MAX_LENGTH, 100_000);
        assert_eq!(TestStream::BATCH_SIZE, 10);
        assert_eq!(TestStream::BLOCK_TIMEOUT_MS, 5_000);
    }
}
