//! Stream event wrapper
//!
//! Wraps a job with its stream metadata (entry ID, correlation ID, timestamp)

use crate::registry::StreamJob;
use chrono::{DateTime, Utc};

/// A stream event containing job data and metadata
#[derive(Debug, Clone)]
pub struct StreamEvent<J: StreamJob> {
    /// Redis stream entry ID (e.g., "1234567890123-0").
    ///
    /// Assigned by Redis at XADD time and stable across redeliveries.
    pub stream_id: String,

    /// The job payload
    pub job: J,

    /// Optional `request_id` field written by the producer
    pub correlation_id: Option<String>,

    /// When the event was created (parsed from stream ID)
    pub timestamp: DateTime<Utc>,
}

impl<J: StreamJob> StreamEvent<J> {
    /// Create a new StreamEvent
    pub fn new(stream_id: impl Into<String>, job: J) -> Self {
        let stream_id = stream_id.into();
        let timestamp = Self::parse_timestamp(&stream_id);
        Self {
            stream_id,
            job,
            correlation_id: None,
            timestamp,
        }
    }

    /// Attach the producer's correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Parse timestamp from Redis stream ID
    ///
    /// Stream IDs are in format "timestamp_ms-sequence"
    fn parse_timestamp(stream_id: &str) -> DateTime<Utc> {
        stream_id
            .split('-')
            .next()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }

    /// Get how long ago the event was created
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.timestamp
    }

    /// Get age in milliseconds
    pub fn age_ms(&self) -> i64 {
        self.age().num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize, Debug)]
    struct TestJob {
        id: String,
    }

    #[test]
    fn test_parse_timestamp() {
        let job = TestJob {
            id: "test-1".to_string(),
        };

        let now_ms = Utc::now().timestamp_millis();
        let stream_id = format!("{}-0", now_ms);

        let event = StreamEvent::new(stream_id, job);

        assert!(event.age_ms() < 1000);
        assert!(event.correlation_id.is_none());
    }

    #[test]
    fn test_fixed_timestamp_and_correlation() {
        let job = TestJob {
            id: "test-1".to_string(),
        };

        let event = StreamEvent::new("1700000000000-3", job)
            .with_correlation_id(Some("req-42".to_string()));

        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(event.correlation_id.as_deref(), Some("req-42"));
        assert_eq!(event.job.id, "test-1");
    }

    #[test]
    fn test_unparsable_id_falls_back_to_now() {
        let event = StreamEvent::new("not-an-id", TestJob { id: "x".into() });
        assert!(event.age_ms() < 1000);
    }
}
