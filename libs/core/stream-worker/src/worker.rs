//! The generic StreamWorker loop.
//!
//! Entries are processed one at a time. A transiently failing entry is left
//! pending in the consumer group and picked up again by the next pending
//! read; its stream ID, and therefore any key derived from it, never changes.

use crate::config::WorkerConfig;
use crate::consumer::{StreamConsumer, StreamEntry};
use crate::dlq::{DlqEntry, DlqManager};
use crate::error::{ErrorCategory, StreamError};
use crate::metrics::StreamMetrics;
use crate::registry::{StreamJob, StreamProcessor};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What to do with an entry whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Leave pending and retry after the delay
    Retry(Duration),
    /// Dead-letter and acknowledge
    DeadLetter,
}

/// Backoff before the next attempt after `failures` failed attempts.
pub(crate) fn retry_delay(failures: u32) -> Duration {
    Duration::from_millis(ErrorCategory::Transient.backoff_delay_ms(failures.saturating_sub(1)))
}

/// `attempts_made` counts failures so far, including the current one.
pub(crate) fn failure_disposition(
    category: ErrorCategory,
    attempts_made: u32,
    max_retries: u32,
) -> Disposition {
    match category {
        ErrorCategory::Permanent => Disposition::DeadLetter,
        ErrorCategory::Transient if attempts_made <= max_retries => {
            Disposition::Retry(retry_delay(attempts_made))
        }
        ErrorCategory::Transient => Disposition::DeadLetter,
    }
}

/// Generic stream worker that processes jobs using a processor.
///
/// Handles consumer group setup, recovery of abandoned entries, retry with
/// exponential backoff, dead-lettering and graceful shutdown.
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: StreamConsumer,
    dlq: DlqManager,
    processor: Arc<P>,
    config: WorkerConfig,
    metrics: StreamMetrics,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J> + 'static,
{
    /// Create a new stream worker.
    pub fn new(redis: ConnectionManager, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(redis, Arc::new(processor), config)
    }

    /// Create a new stream worker with an Arc processor.
    pub fn with_arc_processor(
        redis: ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let dlq = DlqManager::new(redis.clone(), config.dlq_stream.clone())
            .with_max_length(config.dlq_max_length);
        let metrics = StreamMetrics::new(config.stream_name.clone(), processor.name());

        Self {
            consumer: StreamConsumer::new(redis, config.clone()),
            dlq,
            processor,
            config,
            metrics,
            _phantom: PhantomData,
        }
    }

    /// Run the worker loop until the shutdown flag flips to `true` (or its
    /// sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            "Starting stream worker"
        );

        self.consumer.ensure_consumer_group().await?;

        match self.processor.health_check().await {
            Ok(true) => debug!(processor = %self.processor.name(), "Processor healthy"),
            Ok(false) => warn!(processor = %self.processor.name(), "Processor reports unhealthy"),
            Err(e) => warn!(processor = %self.processor.name(), error = %e, "Processor health check failed"),
        }

        self.claim_abandoned().await;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let claim_interval = Duration::from_millis(self.config.claim_idle_ms);
        let mut last_claim = Instant::now();
        let mut attempts: HashMap<String, u32> = HashMap::new();
        let mut consecutive_errors: u32 = 0;
        let mut stopping = false;

        while !stopping && !*shutdown.borrow() {
            // Entries of a consumer that died after startup only become
            // claimable once they have been idle for `claim_idle_ms`.
            if last_claim.elapsed() >= claim_interval {
                self.claim_abandoned().await;
                last_claim = Instant::now();
            }

            let batch = tokio::select! {
                batch = self.next_batch() => batch,
                changed = shutdown.changed() => {
                    stopping = changed.is_err() || *shutdown.borrow();
                    continue;
                }
            };

            let entries = match batch {
                Ok(entries) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Connection recovered");
                        consecutive_errors = 0;
                    }
                    entries
                }
                Err(e) if e.is_timeout() => {
                    debug!("Read timed out, continuing");
                    continue;
                }
                Err(e) => {
                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else {
                        let backoff = Duration::from_millis(
                            ErrorCategory::Transient.backoff_delay_ms(consecutive_errors - 1),
                        );
                        warn!(
                            error = %e,
                            consecutive_errors,
                            connection = e.is_connection_error(),
                            backoff_ms = backoff.as_millis() as u64,
                            "Failed to read from stream, backing off"
                        );
                        stopping = sleep_or_shutdown(backoff, &mut shutdown).await;
                    }
                    continue;
                }
            };

            if entries.is_empty() {
                if !self.config.is_blocking() {
                    stopping = sleep_or_shutdown(poll_interval, &mut shutdown).await;
                }
                continue;
            }

            for entry in entries {
                if *shutdown.borrow() {
                    break;
                }

                if let Some(delay) = self.handle_entry(entry, &mut attempts).await {
                    stopping = sleep_or_shutdown(delay, &mut shutdown).await;
                    if stopping {
                        break;
                    }
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    async fn claim_abandoned(&self) {
        match self.consumer.claim_abandoned().await {
            Ok(0) => {}
            Ok(count) => self.metrics.messages_claimed(count),
            Err(e) => warn!(error = %e, "Failed to claim abandoned messages"),
        }
    }

    /// Redeliveries first; new entries only once nothing is pending.
    async fn next_batch(&self) -> Result<Vec<StreamEntry<J>>, StreamError> {
        let pending = self.consumer.read_pending::<J>().await?;
        if !pending.is_empty() {
            debug!(count = pending.len(), "Processing pending entries");
            return Ok(pending);
        }

        self.consumer.read_new::<J>().await
    }

    /// Process one entry. Returns the delay to wait before the next attempt
    /// when the entry was left pending for retry.
    async fn handle_entry(
        &self,
        entry: StreamEntry<J>,
        attempts: &mut HashMap<String, u32>,
    ) -> Option<Duration> {
        let event = match entry {
            StreamEntry::Event(event) => event,
            StreamEntry::Malformed(malformed) => {
                let stream_id = malformed.stream_id.clone();
                let failures = bump_attempts(attempts, &stream_id);
                let entry = DlqEntry::new(
                    malformed.stream_id,
                    malformed.raw,
                    malformed.reason,
                    ErrorCategory::Permanent,
                    failures,
                );
                if self.dead_letter(entry).await {
                    attempts.remove(&stream_id);
                    return None;
                }
                return Some(retry_delay(failures));
            }
        };

        debug!(stream_id = %event.stream_id, age_ms = event.age_ms(), "Processing job");
        let start = Instant::now();

        match self.processor.process(&event).await {
            Ok(()) => {
                attempts.remove(&event.stream_id);
                self.metrics.job_processed(start.elapsed());

                if let Err(e) = self.consumer.ack(&event.stream_id).await {
                    error!(stream_id = %event.stream_id, error = %e, "Failed to ACK message");
                }
                None
            }
            Err(e) => {
                let category = e.category();
                self.metrics.job_failed(category.as_ref());

                let made = bump_attempts(attempts, &event.stream_id);

                match failure_disposition(category, made, self.config.max_retries) {
                    Disposition::Retry(delay) => {
                        self.metrics.job_retried();
                        warn!(
                            stream_id = %event.stream_id,
                            error = %e,
                            attempt = made,
                            delay_ms = delay.as_millis() as u64,
                            "Job failed, leaving pending for retry"
                        );
                        Some(delay)
                    }
                    Disposition::DeadLetter => {
                        warn!(
                            stream_id = %event.stream_id,
                            error = %e,
                            error_category = ?category,
                            attempts = made,
                            "Job failed, moving to DLQ"
                        );

                        let payload = serde_json::to_string(&event.job).ok();
                        let entry = DlqEntry::new(
                            event.stream_id.clone(),
                            payload,
                            e.to_string(),
                            category,
                            made,
                        );
                        if self.dead_letter(entry).await {
                            attempts.remove(&event.stream_id);
                            None
                        } else {
                            // Still pending; the count keeps growing the backoff
                            Some(retry_delay(made))
                        }
                    }
                }
            }
        }
    }

    /// Write to the DLQ, then ack. Returns `false` when the DLQ write failed
    /// and the entry was left pending.
    async fn dead_letter(&self, entry: DlqEntry) -> bool {
        if let Err(e) = self.dlq.move_to_dlq(&entry).await {
            error!(
                stream_id = %entry.original_stream_id,
                error = %e,
                "Failed to move job to DLQ, leaving it pending"
            );
            return false;
        }

        self.metrics.job_moved_to_dlq();

        if let Err(e) = self.consumer.ack(&entry.original_stream_id).await {
            error!(stream_id = %entry.original_stream_id, error = %e, "Failed to ACK message");
        }
        true
    }
}

fn bump_attempts(attempts: &mut HashMap<String, u32>, stream_id: &str) -> u32 {
    let count = attempts.entry(stream_id.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Returns `true` when shutdown was requested while waiting.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
