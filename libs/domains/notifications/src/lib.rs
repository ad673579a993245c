//! Notifications Domain
//!
//! Idempotent email notifications: each "notification requested" event is
//! rendered into a multipart email and sent over SMTP at most once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Publisher    │  ← Validates and queues events
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Redis Stream  │  ← notifications:requested
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ EventTranslator │  ← Validates, derives the delivery key, skips duplicates
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐     ┌──────────────┐
//! │   Dispatcher    │ ──▶ │ RecordStore  │  ← sent=false before, sent=true after
//! └────────┬────────┘     └──────────────┘
//!          │
//! ┌────────▼────────┐
//! │ EmailRenderer   │  ← $placeholder templates, HTML-escaped html part
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ SmtpTransmitter │  ← connect, STARTTLS, AUTH, NOOP, send, close
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{
//!     EmailRenderer, EventTranslator, NotificationDispatcher, RedisRecordStore,
//!     SmtpConfig, SmtpTransmitter,
//! };
//!
//! let store = Arc::new(RedisRecordStore::new(redis, "notification:record"));
//! let renderer = EmailRenderer::new(from, plaintext_template, html_template);
//! let transmitter = Arc::new(SmtpTransmitter::new(SmtpConfig::from_env()?));
//! let dispatcher = NotificationDispatcher::new(store, renderer, transmitter);
//! let translator = EventTranslator::new(dispatcher, KeyStrategy::EventId);
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod providers;
pub mod renderer;
pub mod service;
pub mod store;
pub mod streams;
pub mod templates;
pub mod translator;

// Re-export commonly used types
pub use config::{KeyStrategy, NotifierConfig};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use error::{NotificationError, NotificationResult};
pub use models::{DeliveryKey, DeliveryRecord, NotificationEvent};
pub use providers::{SmtpConfig, SmtpCredentials, SmtpTransmitter, Transmitter};
pub use renderer::{EmailRenderer, RenderedEmail};
pub use service::NotificationPublisher;
pub use store::{InMemoryRecordStore, RecordStore, RedisRecordStore};
pub use streams::NotificationStream;
pub use templates::{EmailTemplate, TemplateKind};
pub use translator::EventTranslator;
