//! Data models for the notifications domain.

use crate::error::NotificationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use validator::{Validate, ValidateEmail, ValidationError};

// ============================================================================
// Inbound event
// ============================================================================

/// A "notification requested" event as published on the stream.
///
/// Every field is also available to templates under its own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NotificationEvent {
    /// Primary recipient.
    #[validate(email)]
    pub recipient_email: String,
    /// Carbon-copy recipients, possibly empty.
    #[serde(default)]
    #[validate(custom(function = "validate_email_list"))]
    pub email_cc: Vec<String>,
    /// Blind carbon-copy recipients, possibly empty.
    #[serde(default)]
    #[validate(custom(function = "validate_email_list"))]
    pub email_bcc: Vec<String>,
    #[validate(length(min = 1))]
    pub subject: String,
    pub recipient_name: String,
    pub plaintext_body: String,
}

fn validate_email_list(emails: &[String]) -> Result<(), ValidationError> {
    if emails.iter().all(|email| email.validate_email()) {
        Ok(())
    } else {
        Err(ValidationError::new("email_list"))
    }
}

// ============================================================================
// Delivery records
// ============================================================================

/// Identity of one notification occurrence for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    /// Key by the identifier the transport assigned to the event.
    pub fn from_event_id(event_id: impl Into<String>) -> Self {
        Self(event_id.into())
    }

    /// Key by a SHA-256 of the event's JSON, salted with a correlation id
    /// so identical payloads from distinct requests stay distinct.
    pub fn from_content(
        event: &NotificationEvent,
        correlation_id: Option<&str>,
    ) -> NotificationResult<Self> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(event)?);
        if let Some(correlation_id) = correlation_id {
            hasher.update(correlation_id.as_bytes());
        }
        Ok(Self(const_hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persistent marker for one delivery lifecycle.
///
/// `sent` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub key: DeliveryKey,
    #[serde(default)]
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// A record created before the first send attempt.
    pub fn pending(key: DeliveryKey) -> Self {
        Self {
            key,
            sent: false,
            sent_at: None,
        }
    }

    pub fn mark_sent(&mut self) {
        if !self.sent {
            self.sent = true;
            self.sent_at = Some(Utc::now());
        }
    }
}
