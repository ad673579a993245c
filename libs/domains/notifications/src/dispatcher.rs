//! Idempotent delivery of one notification.
//!
//! The record for a key is written (`sent = false`) before any send attempt
//! and flipped to `sent = true` only after the relay accepted the message.
//! A crash in between leads to one more send attempt on redelivery, never
//! to a dropped notification or a second record.
//!
//! Concurrent dispatch of the same key is not guarded here; the stream
//! worker processes entries one at a time.

use crate::error::NotificationResult;
use crate::models::{DeliveryKey, DeliveryRecord, NotificationEvent};
use crate::providers::Transmitter;
use crate::renderer::EmailRenderer;
use crate::store::RecordStore;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// What a dispatch call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The email was transmitted and the record marked sent.
    Sent,
    /// A sent record already existed; nothing was done.
    AlreadySent,
}

pub struct NotificationDispatcher<S: RecordStore, T: Transmitter> {
    store: Arc<S>,
    renderer: EmailRenderer,
    transmitter: Arc<T>,
}

impl<S: RecordStore, T: Transmitter> NotificationDispatcher<S, T> {
    pub fn new(store: Arc<S>, renderer: EmailRenderer, transmitter: Arc<T>) -> Self {
        Self {
            store,
            renderer,
            transmitter,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Deliver `event` at most once per `key`.
    ///
    /// Render and transmission errors propagate unchanged and leave the
    /// record unsent, so calling again with the same key retries in full.
    #[instrument(skip_all, fields(delivery_key = %key))]
    pub async fn dispatch(
        &self,
        event: &NotificationEvent,
        key: &DeliveryKey,
    ) -> NotificationResult<DispatchOutcome> {
        let mut record = match self.store.get_by_id(key).await? {
            Some(record) if record.sent => {
                info!("Notification already sent, skipping");
                return Ok(DispatchOutcome::AlreadySent);
            }
            Some(record) => {
                debug!("Unsent record found, retrying delivery");
                record
            }
            None => {
                let record = DeliveryRecord::pending(key.clone());
                self.store.upsert(&record).await?;
                record
            }
        };

        let email = self.renderer.render(event).inspect_err(|e| {
            error!(
                error = %e,
                template_error = e.is_template_error(),
                "Failed to render notification email"
            );
        })?;

        self.transmitter.send(&email).await?;

        record.mark_sent();
        self.store.update(&record).await?;

        info!(
            transmitter = self.transmitter.name(),
            to = %email.to,
            "Notification delivered"
        );
        Ok(DispatchOutcome::Sent)
    }
}

impl<S: RecordStore, T: Transmitter> Clone for NotificationDispatcher<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            renderer: self.renderer.clone(),
            transmitter: Arc::clone(&self.transmitter),
        }
    }
}
