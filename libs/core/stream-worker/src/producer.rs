//! Stream producer for job enqueuing
//!
//! Used by upstream services (and tests) to publish jobs in the entry layout
//! `StreamConsumer` reads.
//!
//! # Example
//!
//! ```rust,ignore
//! use stream_worker::StreamProducer;
//!
//! let producer = StreamProducer::from_stream_def::<NotificationStream>(redis);
//! let entry_id = producer.send(&payload, Some("req-123")).await?;
//! ```

use crate::error::StreamError;
use crate::registry::{MessageKey, StreamDef};
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::debug;

/// Generic stream producer for enqueuing jobs.
pub struct StreamProducer {
    redis: ConnectionManager,
    stream_name: String,
    max_length: i64,
}

impl StreamProducer {
    /// Create a new StreamProducer for a specific stream.
    pub fn new(redis: ConnectionManager, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    /// Create a producer from a `StreamDef` implementation.
    pub fn from_stream_def<S: StreamDef>(redis: ConnectionManager) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            max_length: S::MAX_LENGTH,
        }
    }

    /// Get the stream name.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Enqueue a job, optionally tagged with a correlation ID.
    ///
    /// Returns the Redis stream entry ID.
    pub async fn send<J: Serialize>(
        &self,
        job: &J,
        request_id: Option<&str>,
    ) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        let job_json = serde_json::to_string(job)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(MessageKey::Job.as_ref())
            .arg(&job_json)
            .arg(MessageKey::CreatedAt.as_ref())
            .arg(Utc::now().to_rfc3339());

        if let Some(request_id) = request_id {
            cmd.arg(MessageKey::RequestId.as_ref()).arg(request_id);
        }

        let stream_id: String = cmd.query_async(&mut conn).await?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            "Enqueued job"
        );

        Ok(stream_id)
    }
}
