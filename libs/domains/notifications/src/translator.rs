//! Stream processor turning raw events into dispatches.

use crate::config::KeyStrategy;
use crate::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::error::{NotificationError, NotificationResult};
use crate::models::{DeliveryKey, NotificationEvent};
use crate::providers::Transmitter;
use crate::store::RecordStore;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use stream_worker::{StreamError, StreamEvent, StreamProcessor};
use tracing::{info, warn};
use validator::Validate;

/// Validates inbound payloads and hands them to the dispatcher.
pub struct EventTranslator<S: RecordStore, T: Transmitter> {
    dispatcher: NotificationDispatcher<S, T>,
    key_strategy: KeyStrategy,
}

impl<S: RecordStore, T: Transmitter> EventTranslator<S, T> {
    pub fn new(dispatcher: NotificationDispatcher<S, T>, key_strategy: KeyStrategy) -> Self {
        Self {
            dispatcher,
            key_strategy,
        }
    }

    /// Parse and validate the payload carried by a stream entry.
    pub fn parse_event(payload: &Value) -> NotificationResult<NotificationEvent> {
        let event = NotificationEvent::deserialize(payload)
            .map_err(|e| NotificationError::InvalidEvent(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    pub fn delivery_key(
        &self,
        stream_event: &StreamEvent<Value>,
        event: &NotificationEvent,
    ) -> NotificationResult<DeliveryKey> {
        match self.key_strategy {
            KeyStrategy::EventId => Ok(DeliveryKey::from_event_id(&stream_event.stream_id)),
            KeyStrategy::ContentHash => {
                DeliveryKey::from_content(event, stream_event.correlation_id.as_deref())
            }
        }
    }

    pub async fn translate(&self, stream_event: &StreamEvent<Value>) -> NotificationResult<DispatchOutcome> {
        let event = Self::parse_event(&stream_event.job).inspect_err(|e| {
            warn!(event_id = %stream_event.stream_id, error = %e, "Rejected notification event");
        })?;
        let key = self.delivery_key(stream_event, &event)?;

        if let Some(record) = self.dispatcher.store().get_by_id(&key).await? {
            if record.sent {
                info!(
                    event_id = %stream_event.stream_id,
                    delivery_key = %key,
                    "Duplicate notification event, skipping"
                );
                return Ok(DispatchOutcome::AlreadySent);
            }
        }

        self.dispatcher.dispatch(&event, &key).await
    }
}

#[async_trait]
impl<S, T> StreamProcessor<Value> for EventTranslator<S, T>
where
    S: RecordStore + 'static,
    T: Transmitter + 'static,
{
    async fn process(&self, event: &StreamEvent<Value>) -> Result<(), StreamError> {
        self.translate(event).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "EventTranslator"
    }
}
