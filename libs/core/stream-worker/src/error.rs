//! Stream errors and how the worker reacts to them.
//!
//! A **transient** failure leaves the entry pending so the next pending read
//! retries it after a backoff. A **permanent** failure dead-letters the entry
//! at once.

use strum::{AsRefStr, Display};
use thiserror::Error;

const TRANSIENT_BASE_DELAY_MS: u64 = 1_000;
const TRANSIENT_MAX_DELAY_MS: u64 = 30_000;

/// Retry class of a failure. Renders as `transient` / `permanent` in
/// metrics labels and dead-letter entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorCategory {
    Transient,
    Permanent,
}

impl ErrorCategory {
    /// Delay before retry number `retry` (0-based): doubles from 1s, capped
    /// at 30s. Always 0 for permanent failures.
    pub fn backoff_delay_ms(&self, retry: u32) -> u64 {
        match self {
            ErrorCategory::Permanent => 0,
            ErrorCategory::Transient => TRANSIENT_BASE_DELAY_MS
                .saturating_mul(2u64.saturating_pow(retry))
                .min(TRANSIENT_MAX_DELAY_MS),
        }
    }
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Raised by a processor; the category decides retry or dead-letter.
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        category: ErrorCategory,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    pub fn transient(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Redis(_) => ErrorCategory::Transient,
            StreamError::Processing { category, .. } => *category,
            StreamError::Serialization(_) | StreamError::Config(_) => ErrorCategory::Permanent,
        }
    }

    /// The consumer group (or the stream) does not exist.
    pub fn is_nogroup_error(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.to_string().contains("NOGROUP"))
    }

    /// Client-side command timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.is_timeout())
    }

    /// Refused, dropped or otherwise broken connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StreamError::Redis(e)
                if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error()
        )
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_backoff_doubles_and_caps() {
        let delays: Vec<u64> = (0..6)
            .map(|retry| ErrorCategory::Transient.backoff_delay_ms(retry))
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000]);
        assert_eq!(ErrorCategory::Transient.backoff_delay_ms(64), 30_000);
        assert_eq!(ErrorCategory::Permanent.backoff_delay_ms(3), 0);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ErrorCategory::Transient.as_ref(), "transient");
        assert_eq!(ErrorCategory::Permanent.to_string(), "permanent");
    }

    #[test]
    fn test_processing_errors_keep_their_category() {
        assert_eq!(StreamError::transient("busy").category(), ErrorCategory::Transient);
        let permanent = StreamError::permanent("bad payload");
        assert_eq!(permanent.category(), ErrorCategory::Permanent);
        assert_eq!(permanent.to_string(), "Processing error: bad payload");
    }

    #[test]
    fn test_serialization_errors_are_permanent() {
        let err: StreamError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(!err.is_nogroup_error());
        assert!(!err.is_timeout());
        assert!(!err.is_connection_error());
    }
}
