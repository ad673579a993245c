//! Redis connection with startup retries.

use core_config::redis::RedisConfig;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 5;
const INITIAL_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 5_000;

/// Open a `ConnectionManager` and verify it with PING.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    Ok(manager)
}

/// Connect, retrying with exponential backoff while Redis comes up.
pub async fn connect_with_retry(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY_MS;

    loop {
        match connect(&config.url).await {
            Ok(manager) => {
                info!(attempts = attempt + 1, "Connected to Redis");
                return Ok(manager);
            }
            Err(e) if attempt < MAX_RETRIES => {
                attempt += 1;
                warn!(
                    attempt,
                    max_retries = MAX_RETRIES,
                    delay_ms = delay,
                    error = %e,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(MAX_DELAY_MS);
            }
            Err(e) => return Err(e),
        }
    }
}
