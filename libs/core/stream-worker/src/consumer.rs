//! Stream consumer for Redis operations
//!
//! Handles reading messages from Redis streams using consumer groups.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::registry::{MessageKey, StreamJob};
use redis::aio::ConnectionManager;
use redis::RedisResult;
use tracing::{debug, info, warn};

// (stream, [(entry id, fields)]); fields are nil for entries deleted while pending
type StreamEntries = Vec<(String, Option<Vec<(String, String)>>)>;
type StreamReadReply = Vec<(String, StreamEntries)>;

/// One entry read from the stream.
#[derive(Debug, Clone)]
pub enum StreamEntry<J: StreamJob> {
    /// The `job` field deserialized into `J`.
    Event(StreamEvent<J>),
    /// The entry could not be turned into a job.
    Malformed(MalformedEntry),
}

impl<J: StreamJob> StreamEntry<J> {
    pub fn stream_id(&self) -> &str {
        match self {
            StreamEntry::Event(event) => &event.stream_id,
            StreamEntry::Malformed(entry) => &entry.stream_id,
        }
    }
}

/// An entry with a missing or undecodable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    pub stream_id: String,
    /// Raw `job` field, when present
    pub raw: Option<String>,
    pub reason: String,
}

/// Stream consumer for Redis operations
pub struct StreamConsumer {
    redis: ConnectionManager,
    config: WorkerConfig,
}

impl StreamConsumer {
    /// Create a new StreamConsumer
    pub fn new(redis: ConnectionManager, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    /// Create the consumer group if it doesn't exist
    pub async fn ensure_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Read entries delivered to this consumer but not yet acknowledged.
    ///
    /// These are redeliveries: entries whose processing failed transiently,
    /// or entries claimed from an abandoned consumer.
    pub async fn read_pending<J: StreamJob>(&self) -> Result<Vec<StreamEntry<J>>, StreamError> {
        let mut conn = self.redis.clone();

        let streams: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg("0")
            .query_async(&mut conn)
            .await?;

        Ok(parse_stream_response(streams))
    }

    /// Read new entries, blocking up to the configured timeout.
    pub async fn read_new<J: StreamJob>(&self) -> Result<Vec<StreamEntry<J>>, StreamError> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if let Some(timeout) = self.config.block_timeout_ms {
            cmd.arg("BLOCK").arg(timeout);
        }

        cmd.arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">");

        // Nil reply when BLOCK times out with nothing to deliver
        let result: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;

        Ok(result.map(parse_stream_response).unwrap_or_default())
    }

    /// Acknowledge a message
    pub async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged message");
        Ok(())
    }

    /// Claim entries other consumers left pending for longer than
    /// `claim_idle_ms`. Claimed entries show up in the next `read_pending`.
    pub async fn claim_abandoned(&self) -> Result<usize, StreamError> {
        let mut conn = self.redis.clone();

        // (id, consumer, idle ms, delivery count)
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size * 10)
            .query_async(&mut conn)
            .await?;

        let claim_ids: Vec<&str> = pending
            .iter()
            .filter(|(_, consumer, idle, _)| {
                consumer != &self.config.consumer_id && *idle >= self.config.claim_idle_ms
            })
            .map(|(id, _, _, _)| id.as_str())
            .collect();

        if claim_ids.is_empty() {
            return Ok(0);
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_idle_ms)
            .arg(&claim_ids)
            .arg("JUSTID");

        let claimed: Vec<String> = cmd.query_async(&mut conn).await?;

        if !claimed.is_empty() {
            warn!(count = claimed.len(), "Claimed abandoned messages");
        }

        Ok(claimed.len())
    }
}

fn parse_stream_response<J: StreamJob>(streams: StreamReadReply) -> Vec<StreamEntry<J>> {
    streams
        .into_iter()
        .flat_map(|(_stream, entries)| entries)
        .map(|(stream_id, fields)| parse_entry(stream_id, fields.unwrap_or_default()))
        .collect()
}

/// Turn a raw entry into a typed event, or describe why it cannot be one.
pub(crate) fn parse_entry<J: StreamJob>(
    stream_id: String,
    fields: Vec<(String, String)>,
) -> StreamEntry<J> {
    let field = |key: MessageKey| {
        fields
            .iter()
            .find(|(k, _)| k == key.as_ref())
            .map(|(_, v)| v.clone())
    };

    let Some(json) = field(MessageKey::Job) else {
        warn!(
            stream_id = %stream_id,
            fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            "Missing 'job' field in message"
        );
        return StreamEntry::Malformed(MalformedEntry {
            stream_id,
            raw: None,
            reason: "missing 'job' field".to_string(),
        });
    };

    match serde_json::from_str::<J>(&json) {
        Ok(job) => StreamEntry::Event(
            StreamEvent::new(stream_id, job).with_correlation_id(field(MessageKey::RequestId)),
        ),
        Err(e) => {
            warn!(stream_id = %stream_id, error = %e, "Failed to parse job");
            StreamEntry::Malformed(MalformedEntry {
                stream_id,
                raw: Some(json),
                reason: format!("undecodable 'job' field: {}", e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestJob {
        name: String,
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_entry_with_job_and_request_id() {
        let entry: StreamEntry<TestJob> = parse_entry(
            "1-0".to_string(),
            fields(&[("job", r#"{"name":"a"}"#), ("request_id", "req-1")]),
        );

        match entry {
            StreamEntry::Event(event) => {
                assert_eq!(event.stream_id, "1-0");
                assert_eq!(event.job.name, "a");
                assert_eq!(event.correlation_id.as_deref(), Some("req-1"));
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_entry_missing_job_field() {
        let entry: StreamEntry<TestJob> =
            parse_entry("2-0".to_string(), fields(&[("payload", "{}")]));

        assert_eq!(entry.stream_id(), "2-0");
        assert!(matches!(
            entry,
            StreamEntry::Malformed(MalformedEntry { raw: None, .. })
        ));
    }

    #[test]
    fn test_parse_entry_invalid_json_keeps_raw_payload() {
        let entry: StreamEntry<TestJob> =
            parse_entry("3-0".to_string(), fields(&[("job", "not json")]));

        match entry {
            StreamEntry::Malformed(malformed) => {
                assert_eq!(malformed.raw.as_deref(), Some("not json"));
                assert!(malformed.reason.contains("undecodable"));
            }
            other => panic!("expected malformed entry, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_stream_response_flattens_and_tolerates_deleted_entries() {
        let reply: StreamReadReply = vec![(
            "test:stream".to_string(),
            vec![
                ("1-0".to_string(), Some(fields(&[("job", r#"{"name":"a"}"#)]))),
                ("2-0".to_string(), None),
            ],
        )];

        let entries: Vec<StreamEntry<TestJob>> = parse_stream_response(reply);
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], StreamEntry::Event(_)));
        assert!(matches!(entries[1], StreamEntry::Malformed(_)));
    }
}
