//! Redis container for stream and record-store tests.

use redis::aio::ConnectionManager;
use redis::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Throwaway Redis 8 container plus a shared `ConnectionManager`.
///
/// The container is removed when the value is dropped, so keep it alive for
/// the whole test.
///
/// ```no_run
/// use test_utils::TestRedis;
///
/// # async fn example() {
/// let redis = TestRedis::new().await;
/// redis.add_raw("notifications:requested", &[("job", "{}")]).await;
/// assert_eq!(redis.stream_len("notifications:requested").await, 1);
/// # }
/// ```
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    connection: ConnectionManager,
    url: String,
}

impl TestRedis {
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");
        let url = format!("redis://127.0.0.1:{}", port);

        let client = Client::open(url.as_str()).expect("Failed to create Redis client");
        let connection = ConnectionManager::new(client)
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(port, "Test Redis ready");

        Self {
            _container: container,
            connection,
            url,
        }
    }

    /// Cloned handle for stores, producers and workers.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// `redis://` URL of the container.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// XADD arbitrary fields, bypassing any producer envelope.
    pub async fn add_raw(&self, stream: &str, fields: &[(&str, &str)]) -> String {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (field, value) in fields {
            cmd.arg(*field).arg(*value);
        }

        let mut conn = self.connection();
        cmd.query_async(&mut conn).await.expect("XADD failed")
    }

    pub async fn stream_len(&self, stream: &str) -> usize {
        let mut conn = self.connection();
        redis::cmd("XLEN")
            .arg(stream)
            .query_async(&mut conn)
            .await
            .expect("XLEN failed")
    }

    /// Entries delivered to `group` but not yet acknowledged.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        let mut conn = self.connection();
        let summary: redis::Value = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .query_async(&mut conn)
            .await
            .expect("XPENDING failed");

        match summary {
            redis::Value::Array(items) => match items.first() {
                Some(redis::Value::Int(count)) => *count as usize,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Raw string value stored under `key`, if any.
    pub async fn get_string(&self, key: &str) -> Option<String> {
        let mut conn = self.connection();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .expect("GET failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_raw_entries_are_counted() {
        let redis = TestRedis::new().await;

        let id = redis.add_raw("test:stream", &[("job", "{}")]).await;

        assert!(id.contains('-'));
        assert_eq!(redis.stream_len("test:stream").await, 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_get_string_missing_key() {
        let redis = TestRedis::new().await;
        assert!(redis.url().starts_with("redis://127.0.0.1:"));
        assert_eq!(redis.get_string("nothing:here").await, None);
    }
}
