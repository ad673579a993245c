//! Notification Worker Service
//!
//! A background worker that turns notification events into emails.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (notifications:requested)
//!   ↓ (Consumer Group: notification_workers)
//! StreamWorker<serde_json::Value, EventTranslator>
//!   ↓ (one delivery key per event)
//! NotificationDispatcher<RedisRecordStore, SmtpTransmitter>
//!   ↓
//! SMTP relay
//! ```
//!
//! ## Features
//!
//! - Consumer group support for horizontal scaling
//! - Delivery records make redelivered events a no-op
//! - Automatic retry with exponential backoff for transient failures
//! - Dead letter queue for invalid events and exhausted retries
//! - Graceful shutdown on SIGINT / SIGTERM

pub mod config;
pub mod connection;

use crate::config::WorkerSettings;
use core_config::redis::RedisConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_notifications::{
    EmailRenderer, EventTranslator, NotificationDispatcher, NotificationStream, NotifierConfig,
    RedisRecordStore, SmtpConfig, SmtpTransmitter,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use stream_worker::{init_metrics, StreamWorker, WorkerConfig};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the notification worker
///
/// This is the main entry point for the worker. It:
/// 1. Sets up error reports and structured logging
/// 2. Loads Redis, SMTP and notifier configuration
/// 3. Connects to Redis for records and stream processing
/// 4. Starts the worker with graceful shutdown handling
///
/// # Errors
///
/// Returns an error if configuration is missing or invalid, Redis stays
/// unreachable, or the worker hits a fatal stream error.
pub async fn run() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment, "notification-worker");

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting notification worker"
    );

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let smtp_config = SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?;
    let notifier_config =
        NotifierConfig::from_env().wrap_err("Failed to load notifier configuration")?;
    let settings = WorkerSettings::from_env().wrap_err("Failed to load worker settings")?;

    info!("Connecting to Redis...");
    let redis = connection::connect_with_retry(&redis_config)
        .await
        .wrap_err("Failed to connect to Redis")?;

    init_metrics(settings.metrics_addr).wrap_err("Failed to initialize metrics")?;

    info!(
        host = %smtp_config.host,
        port = smtp_config.port,
        starttls = smtp_config.use_starttls,
        authenticated = smtp_config.credentials.is_some(),
        key_strategy = %notifier_config.key_strategy,
        "Notifier configuration loaded"
    );

    let store = Arc::new(RedisRecordStore::new(
        redis.clone(),
        notifier_config.record_prefix.clone(),
    ));
    let renderer = EmailRenderer::new(
        notifier_config.from_address.clone(),
        notifier_config.plaintext_template.clone(),
        notifier_config.html_template.clone(),
    );
    let transmitter = Arc::new(SmtpTransmitter::new(smtp_config));
    let dispatcher = NotificationDispatcher::new(store, renderer, transmitter);
    let translator = EventTranslator::new(dispatcher, notifier_config.key_strategy);

    let block_ms = (settings.block_ms > 0).then_some(settings.block_ms);
    let worker_config = WorkerConfig::from_stream_def::<NotificationStream>()
        .with_batch_size(settings.batch_size)
        .with_blocking(block_ms)
        .with_max_retries(settings.max_retries)
        .with_claim_idle_ms(settings.claim_idle_ms);
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        block_timeout_ms = ?worker_config.block_timeout_ms,
        batch_size = worker_config.batch_size,
        max_retries = worker_config.max_retries,
        "Worker configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let worker = StreamWorker::<serde_json::Value, _>::new(redis, translator, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    info!("Notification worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .wrap_err("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = async move {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.wrap_err("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
