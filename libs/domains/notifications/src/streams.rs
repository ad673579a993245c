//! Stream definitions for the notifications domain.

use stream_worker::StreamDef;

/// "Notification requested" events.
///
/// Consumed by the courier notification-worker.
pub struct NotificationStream;

impl StreamDef for NotificationStream {
    const STREAM_NAME: &'static str = "notifications:requested";

    const CONSUMER_GROUP: &'static str = "notification_workers";

    const DLQ_STREAM: &'static str = "notifications:dlq";

    const MAX_LENGTH: i64 = 100_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_stream_def() {
        assert_eq!(NotificationStream::stream_name(), "notifications:requested");
        assert_eq!(NotificationStream::consumer_group(), "notification_workers");
        assert_eq!(NotificationStream::dlq_stream(), "notifications:dlq");
        assert_eq!(NotificationStream::MAX_LENGTH, 100_000);
    }
}
