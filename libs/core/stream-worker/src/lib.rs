//! Stream Worker Framework
//!
//! A generic Redis Streams worker for processing background jobs.
//!
//! ## Features
//!
//! - **Generic worker**: `StreamWorker<J, P>` processes any job type
//! - **Consumer groups**: Horizontal scaling with Redis consumer groups
//! - **Stable entry IDs**: Retries re-read the pending entry instead of
//!   re-publishing it, so the entry ID identifies one event for its lifetime
//! - **Dead Letter Queue**: Failed jobs moved to DLQ after max retries
//! - **Prometheus metrics**: Built-in observability
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{StreamWorker, StreamProcessor, StreamDef, WorkerConfig};
//!
//! struct MyStream;
//! impl StreamDef for MyStream {
//!     const STREAM_NAME: &'static str = "my:jobs";
//!     const CONSUMER_GROUP: &'static str = "my_workers";
//!     const DLQ_STREAM: &'static str = "my:dlq";
//! }
//!
//! let config = WorkerConfig::from_stream_def::<MyStream>();
//! let worker = StreamWorker::new(redis, processor, config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod dlq;
mod error;
mod event;
pub mod metrics;
mod producer;
mod registry;
mod worker;

pub use config::WorkerConfig;
pub use consumer::{MalformedEntry, StreamConsumer, StreamEntry};
pub use dlq::{DlqEntry, DlqManager};
pub use error::{ErrorCategory, StreamError};
pub use event::StreamEvent;
pub use metrics::{init_metrics, StreamMetrics};
pub use producer::StreamProducer;
pub use registry::{MessageKey, StreamDef, StreamJob, StreamProcessor};
pub use worker::StreamWorker;
