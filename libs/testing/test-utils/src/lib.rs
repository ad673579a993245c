//! Shared test utilities for the notification crates
//!
//! - `TestSmtpServer`: in-process fake SMTP relay (feature: "smtp", default)
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: deterministic addresses and stream IDs
//! - `assertions`: assertion helpers with readable failure output
//!
//! Redis tests need Docker at runtime; mark them `#[ignore = "requires Docker"]`.
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestDataBuilder, TestSmtpServer};
//!
//! #[tokio::test]
//! async fn delivers() {
//!     let server = TestSmtpServer::start().await;
//!     let data = TestDataBuilder::from_test_name("delivers");
//!     // point the transmitter at server.host() / server.port()
//!     // and key the delivery with data.stream_id(0)
//!     assert!(server.messages().await.is_empty());
//! }
//! ```

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "smtp")]
mod smtp;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

#[cfg(feature = "smtp")]
pub use smtp::{ReceivedMail, SessionLog, TestSmtpServer, TestSmtpServerBuilder};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Seeded test data, so a failing test reproduces with the same values.
#[derive(Debug, Clone, Copy)]
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from the test name; distinct tests get distinct data.
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let a = TestDataBuilder::from_test_name("test_dispatch_twice");
    /// let b = TestDataBuilder::from_test_name("test_dispatch_twice");
    /// assert_eq!(a.stream_id(0), b.stream_id(0));
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Request ID in the shape producers attach to stream entries.
    pub fn request_id(&self) -> String {
        format!("req-{:016x}", self.seed)
    }

    /// Redis-style stream entry ID (`<ms>-<seq>`), unique per sequence number
    pub fn stream_id(&self, sequence: u64) -> String {
        format!("{}-{}", self.seed % 10_000_000_000_000, sequence)
    }

    /// Address under the reserved `example.com` domain
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.email("alice"), "alice.7@example.com");
    /// ```
    pub fn email(&self, local: &str) -> String {
        format!("{}.{}@example.com", local, self.seed)
    }
}

pub mod assertions {
    /// Assert that `haystack` contains `needle`, printing both on failure
    pub fn assert_contains(haystack: &str, needle: &str, context: &str) {
        assert!(
            haystack.contains(needle),
            "{}: expected to find {:?} in:\n{}",
            context,
            needle,
            haystack
        );
    }

    /// Assert that `needle` appears nowhere in `haystack`
    pub fn assert_not_contains(haystack: &str, needle: &str, context: &str) {
        assert!(
            !haystack.contains(needle),
            "{}: did not expect {:?} in:\n{}",
            context,
            needle,
            haystack
        );
    }
}
