//! Worker loop against a real Redis (requires Docker).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{
    DlqManager, StreamError, StreamEvent, StreamProcessor, StreamProducer, StreamWorker,
    WorkerConfig,
};
use test_utils::TestRedis;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Job {
    label: String,
    reject: bool,
}

#[derive(Default)]
struct RecordingProcessor {
    seen: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl StreamProcessor<Job> for RecordingProcessor {
    async fn process(&self, event: &StreamEvent<Job>) -> Result<(), StreamError> {
        self.seen
            .lock()
            .await
            .push((event.job.label.clone(), event.correlation_id.clone()));

        if event.job.reject {
            return Err(StreamError::permanent("rejected"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RecordingProcessor"
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_worker_acks_successes_and_dead_letters_rejections() {
    let redis = TestRedis::new().await;
    let config = WorkerConfig::new("test:jobs", "test_workers")
        .with_blocking(Some(100))
        .with_consumer_id("worker-test");

    let producer = StreamProducer::new(redis.connection(), "test:jobs");
    producer
        .send(&Job { label: "ok".into(), reject: false }, Some("req-1"))
        .await
        .unwrap();
    producer
        .send(&Job { label: "bad".into(), reject: true }, None)
        .await
        .unwrap();

    let processor = Arc::new(RecordingProcessor::default());
    let worker = Arc::new(StreamWorker::with_arc_processor(
        redis.connection(),
        processor.clone(),
        config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    let dlq = DlqManager::new(redis.connection(), "test:dlq");
    let mut dead = Vec::new();
    for _ in 0..50 {
        dead = dlq.list(10).await.unwrap();
        if !dead.is_empty() && processor.seen.lock().await.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let seen = processor.seen.lock().await.clone();
    assert_eq!(
        seen,
        vec![
            ("ok".to_string(), Some("req-1".to_string())),
            ("bad".to_string(), None)
        ]
    );

    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].error, "Processing error: rejected");
    assert_eq!(dead[0].category, "permanent");
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_malformed_entry_is_dead_lettered() {
    let redis = TestRedis::new().await;
    redis.add_raw("test:jobs", &[("unexpected", "field")]).await;

    let processor = Arc::new(RecordingProcessor::default());
    let worker = Arc::new(StreamWorker::with_arc_processor(
        redis.connection(),
        processor.clone(),
        WorkerConfig::new("test:jobs", "test_workers").with_blocking(Some(100)),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    let dlq = DlqManager::new(redis.connection(), "test:dlq");
    let mut dead = Vec::new();
    for _ in 0..50 {
        dead = dlq.list(10).await.unwrap();
        if !dead.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(dead.len(), 1);
    assert!(dead[0].payload.is_none());
    assert!(processor.seen.lock().await.is_empty());
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 0);
}

/// Fails transiently `failures` times, then succeeds. Records every stream id
/// it is handed.
struct FlakyProcessor {
    failures_left: Mutex<u32>,
    seen: Mutex<Vec<String>>,
}

impl FlakyProcessor {
    fn new(failures: u32) -> Self {
        Self {
            failures_left: Mutex::new(failures),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StreamProcessor<Job> for FlakyProcessor {
    async fn process(&self, event: &StreamEvent<Job>) -> Result<(), StreamError> {
        self.seen.lock().await.push(event.stream_id.clone());

        let mut left = self.failures_left.lock().await;
        if *left > 0 {
            *left -= 1;
            return Err(StreamError::transient("relay busy"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FlakyProcessor"
    }
}

fn spawn_worker<P>(
    redis: &TestRedis,
    processor: Arc<P>,
    config: WorkerConfig,
) -> (
    watch::Sender<bool>,
    tokio::task::JoinHandle<Result<(), StreamError>>,
)
where
    P: StreamProcessor<Job> + 'static,
{
    let worker = StreamWorker::with_arc_processor(redis.connection(), processor, config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    (shutdown_tx, handle)
}

async fn send_job(redis: &TestRedis, label: &str, reject: bool) -> String {
    StreamProducer::new(redis.connection(), "test:jobs")
        .send(&Job { label: label.into(), reject }, None)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_transient_failure_is_retried_under_the_same_stream_id() {
    let redis = TestRedis::new().await;
    let stream_id = send_job(&redis, "flaky", false).await;

    let processor = Arc::new(FlakyProcessor::new(2));
    let (shutdown_tx, handle) = spawn_worker(
        &redis,
        processor.clone(),
        WorkerConfig::new("test:jobs", "test_workers").with_blocking(Some(100)),
    );

    // 1s + 2s of backoff before the third attempt
    for _ in 0..80 {
        if processor.seen.lock().await.len() >= 3
            && redis.pending_count("test:jobs", "test_workers").await == 0
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let seen = processor.seen.lock().await.clone();
    assert_eq!(seen, vec![stream_id.clone(), stream_id.clone(), stream_id]);
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 0);
    assert_eq!(redis.stream_len("test:jobs").await, 1);

    let dlq = DlqManager::new(redis.connection(), "test:dlq");
    assert!(dlq.list(10).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_exhausted_retries_are_dead_lettered_and_acked() {
    let redis = TestRedis::new().await;
    let stream_id = send_job(&redis, "always-busy", false).await;

    let processor = Arc::new(FlakyProcessor::new(u32::MAX));
    let (shutdown_tx, handle) = spawn_worker(
        &redis,
        processor.clone(),
        WorkerConfig::new("test:jobs", "test_workers")
            .with_blocking(Some(100))
            .with_max_retries(1),
    );

    let dlq = DlqManager::new(redis.connection(), "test:dlq");
    let mut dead = Vec::new();
    for _ in 0..50 {
        dead = dlq.list(10).await.unwrap();
        if !dead.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(processor.seen.lock().await.len(), 2);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].original_stream_id, stream_id);
    assert_eq!(dead[0].category, "transient");
    assert_eq!(dead[0].attempts, 2);
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_entry_of_a_crashed_consumer_is_claimed_after_startup() {
    let redis = TestRedis::new().await;
    let mut conn = redis.connection();

    let _: () = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg("test:jobs")
        .arg("test_workers")
        .arg("0")
        .arg("MKSTREAM")
        .query_async(&mut conn)
        .await
        .unwrap();
    let stream_id = send_job(&redis, "orphan", false).await;

    // Delivered to a consumer that never acks it
    let _: redis::Value = redis::cmd("XREADGROUP")
        .arg("GROUP")
        .arg("test_workers")
        .arg("worker-crashed")
        .arg("COUNT")
        .arg(10)
        .arg("STREAMS")
        .arg("test:jobs")
        .arg(">")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 1);

    // Not yet idle long enough when the worker starts
    let processor = Arc::new(FlakyProcessor::new(0));
    let (shutdown_tx, handle) = spawn_worker(
        &redis,
        processor.clone(),
        WorkerConfig::new("test:jobs", "test_workers")
            .with_blocking(Some(100))
            .with_consumer_id("worker-replacement")
            .with_claim_idle_ms(500),
    );

    for _ in 0..50 {
        if !processor.seen.lock().await.is_empty()
            && redis.pending_count("test:jobs", "test_workers").await == 0
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(processor.seen.lock().await.clone(), vec![stream_id]);
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failed_dlq_write_backs_off_and_keeps_entry_pending() {
    let redis = TestRedis::new().await;
    let mut conn = redis.connection();

    // XADD onto a plain string key fails with WRONGTYPE; reads still work
    let _: () = redis::cmd("SET")
        .arg("test:dlq")
        .arg("occupied")
        .query_async(&mut conn)
        .await
        .unwrap();
    let stream_id = send_job(&redis, "bad", true).await;

    let processor = Arc::new(RecordingProcessor::default());
    let (shutdown_tx, handle) = spawn_worker(
        &redis,
        processor.clone(),
        WorkerConfig::new("test:jobs", "test_workers").with_blocking(Some(100)),
    );

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let attempts_while_blocked = processor.seen.lock().await.len();
    assert!(
        (1..=2).contains(&attempts_while_blocked),
        "expected backoff between DLQ attempts, saw {} attempts",
        attempts_while_blocked
    );
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 1);

    let _: () = redis::cmd("DEL")
        .arg("test:dlq")
        .query_async(&mut conn)
        .await
        .unwrap();

    let dlq = DlqManager::new(redis.connection(), "test:dlq");
    let mut dead = Vec::new();
    for _ in 0..60 {
        dead = dlq.list(10).await.unwrap();
        if !dead.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].original_stream_id, stream_id);
    assert!(dead[0].attempts >= 2);
    assert_eq!(redis.pending_count("test:jobs", "test_workers").await, 0);
}
