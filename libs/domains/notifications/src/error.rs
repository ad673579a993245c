//! Error types for the notifications domain.

use crate::templates::TemplateKind;
use core_config::ConfigError;
use stream_worker::{ErrorCategory, StreamError};
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while turning an event into a delivered email.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// A template references a placeholder the event does not supply.
    #[error("Nothing supplied for template variable {variable} ({template_type} template)")]
    MissingTemplateVariable {
        variable: String,
        template_type: TemplateKind,
    },

    /// A template could not be parsed.
    #[error("Problem with {template_type} template: {problem}")]
    MalformedTemplate {
        template_type: TemplateKind,
        problem: String,
    },

    /// The relay could not be reached within the connect timeout.
    #[error("Attempt to connect to the SMTP server failed: {0}")]
    ConnectionAttempt(String),

    /// The relay rejected the configured credentials.
    #[error("Failed to log in: {0}")]
    FailedLogin(String),

    /// The relay answered the liveness check with something other than 250.
    #[error("Did not receive 250 status from connection test check: {0}")]
    ServerPing(String),

    /// Any other protocol failure during transmission.
    #[error("Encountered an issue while attempting to send email: {0}")]
    GeneralTransmission(String),

    /// The inbound payload does not describe a valid notification.
    #[error("Invalid notification event: {0}")]
    InvalidEvent(String),

    /// Update of a delivery record that was never created.
    #[error("Delivery record not found: {0}")]
    RecordNotFound(String),

    /// Record store failure.
    #[error("Record store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NotificationError {
    /// Whether retrying the same event can succeed without operator action.
    pub fn category(&self) -> ErrorCategory {
        match self {
            NotificationError::MissingTemplateVariable { .. }
            | NotificationError::MalformedTemplate { .. }
            | NotificationError::FailedLogin(_)
            | NotificationError::InvalidEvent(_)
            | NotificationError::Config(_) => ErrorCategory::Permanent,
            NotificationError::ConnectionAttempt(_)
            | NotificationError::ServerPing(_)
            | NotificationError::GeneralTransmission(_)
            | NotificationError::RecordNotFound(_)
            | NotificationError::Store(_) => ErrorCategory::Transient,
        }
    }

    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            NotificationError::MissingTemplateVariable { .. }
                | NotificationError::MalformedTemplate { .. }
        )
    }
}

impl From<NotificationError> for StreamError {
    fn from(err: NotificationError) -> Self {
        StreamError::Processing {
            category: err.category(),
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        NotificationError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Store(format!("JSON serialization error: {}", err))
    }
}

impl From<ConfigError> for NotificationError {
    fn from(err: ConfigError) -> Self {
        NotificationError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(err: validator::ValidationErrors) -> Self {
        NotificationError::InvalidEvent(err.to_string())
    }
}
