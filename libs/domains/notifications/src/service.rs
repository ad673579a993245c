//! Publishing "notification requested" events.

use crate::error::{NotificationError, NotificationResult};
use crate::models::NotificationEvent;
use crate::streams::NotificationStream;
use redis::aio::ConnectionManager;
use stream_worker::StreamProducer;
use tracing::info;
use validator::Validate;

/// Validates notification events and appends them to the stream.
pub struct NotificationPublisher {
    producer: StreamProducer,
}

impl NotificationPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            producer: StreamProducer::from_stream_def::<NotificationStream>(redis),
        }
    }

    pub fn stream_name(&self) -> &str {
        self.producer.stream_name()
    }

    /// Enqueue an event; returns the stream entry ID, which is also the
    /// event's delivery key under the default key strategy.
    ///
    /// `request_id` salts content-hash keys and is logged by the worker.
    pub async fn publish(
        &self,
        event: &NotificationEvent,
        request_id: Option<&str>,
    ) -> NotificationResult<String> {
        event.validate()?;

        let stream_id = self
            .producer
            .send(event, request_id)
            .await
            .map_err(|e| NotificationError::Store(e.to_string()))?;

        info!(
            stream_id = %stream_id,
            to = %event.recipient_email,
            request_id = ?request_id,
            "Queued notification"
        );

        Ok(stream_id)
    }
}
