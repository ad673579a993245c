//! Email transmission.
//!
//! `Transmitter` is the seam the dispatcher sends through. The production
//! implementation is `SmtpTransmitter`, which drives one SMTP session per
//! email over a pluggable `SmtpConnector`.

mod session;
mod smtp;

pub use session::{LettreConnector, LettreSession, SmtpConnector, SmtpSession};
pub use smtp::{build_message, SmtpConfig, SmtpCredentials, SmtpTransmitter};

use crate::error::NotificationResult;
use crate::renderer::RenderedEmail;
use async_trait::async_trait;

/// Delivers a rendered email. One call, one attempt; no internal retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &RenderedEmail) -> NotificationResult<()>;

    /// Get the transmitter name for logging.
    fn name(&self) -> &'static str;
}
