//! SMTP transmitter.
//!
//! Each send runs one session: connect, optional STARTTLS, optional AUTH,
//! NOOP liveness check, send, close. The session is closed on every path
//! once the connection is open.

use super::session::{LettreConnector, SmtpConnector, SmtpSession};
use super::Transmitter;
use crate::error::{NotificationError, NotificationResult};
use crate::renderer::RenderedEmail;
use async_trait::async_trait;
use core_config::{env_flag, env_optional, env_or_default, env_parse, env_required, ConfigError, FromEnv};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    Message,
};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const DEFAULT_PORT: u16 = 587;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const NOOP_OK: u16 = 250;

/// SMTP login. Both halves are always present.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    username: String,
    password: String,
}

impl SmtpCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// `None` skips AUTH.
    pub credentials: Option<SmtpCredentials>,
    pub use_starttls: bool,
    /// `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Name sent with EHLO.
    pub hello_name: String,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            use_starttls: true,
            connect_timeout: Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            hello_name: "localhost".to_string(),
        }
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(SmtpCredentials::new(username, password));
        self
    }

    /// Builder method to set STARTTLS.
    pub fn with_starttls(mut self, use_starttls: bool) -> Self {
        self.use_starttls = use_starttls;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_hello_name(mut self, hello_name: impl Into<String>) -> Self {
        self.hello_name = hello_name.into();
        self
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_required("SMTP_HOST")?;
        let port = env_parse("SMTP_PORT", DEFAULT_PORT)?;

        let credentials = match (env_optional("SMTP_USERNAME"), env_optional("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => Some(SmtpCredentials::new(username, password)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Invalid {
                    key: "SMTP_PASSWORD".to_string(),
                    details: "SMTP_USERNAME is set without a password".to_string(),
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Invalid {
                    key: "SMTP_USERNAME".to_string(),
                    details: "SMTP_PASSWORD is set without a username".to_string(),
                });
            }
        };

        Ok(Self {
            host,
            port,
            credentials,
            use_starttls: env_flag("SMTP_USE_STARTTLS", true)?,
            connect_timeout: connect_timeout_from_env()?,
            hello_name: env_or_default("SMTP_HELLO_NAME", "localhost"),
        })
    }
}

fn connect_timeout_from_env() -> Result<Option<Duration>, ConfigError> {
    const KEY: &str = "SMTP_CONNECT_TIMEOUT_SECS";

    match env_optional(KEY) {
        None => Ok(Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))),
        Some(raw) if raw.trim().eq_ignore_ascii_case("none") => Ok(None),
        Some(_) => match env_parse::<u64>(KEY, DEFAULT_CONNECT_TIMEOUT_SECS)? {
            0 => Ok(None),
            secs => Ok(Some(Duration::from_secs(secs))),
        },
    }
}

/// Sends rendered emails through an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpTransmitter<C = LettreConnector> {
    config: SmtpConfig,
    connector: C,
}

impl SmtpTransmitter<LettreConnector> {
    pub fn new(config: SmtpConfig) -> Self {
        Self::with_connector(config, LettreConnector)
    }
}

impl<C: SmtpConnector> SmtpTransmitter<C> {
    pub fn with_connector(config: SmtpConfig, connector: C) -> Self {
        Self { config, connector }
    }

    async fn run_session(&self, session: &mut C::Session, message: &Message) -> NotificationResult<()> {
        if self.config.use_starttls {
            session.starttls().await?;
            debug!(host = %self.config.host, "STARTTLS negotiated");
        }

        if let Some(credentials) = &self.config.credentials {
            if let Err(e) = session.login(credentials).await {
                if matches!(e, NotificationError::FailedLogin(_)) {
                    error!(
                        host = %self.config.host,
                        username = %credentials.username(),
                        error = %e,
                        "SMTP relay rejected credentials"
                    );
                }
                return Err(e);
            }
        }

        let code = session.noop().await?;
        if code != NOOP_OK {
            return Err(NotificationError::ServerPing(format!("NOOP replied {}", code)));
        }

        session.send(message).await
    }
}

#[async_trait]
impl<C: SmtpConnector> Transmitter for SmtpTransmitter<C> {
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port))]
    async fn send(&self, email: &RenderedEmail) -> NotificationResult<()> {
        let message = build_message(email)?;

        let mut session = self.connector.connect(&self.config).await?;
        let result = self.run_session(&mut session, &message).await;
        session.close().await;

        match &result {
            Ok(()) => info!(
                to = %email.to,
                cc_count = email.cc.len(),
                bcc_count = email.bcc.len(),
                "Email sent via SMTP"
            ),
            Err(e) => error!(to = %email.to, error = %e, "SMTP transmission failed"),
        }

        result
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }
}

/// Build a multipart/alternative message (text/plain then text/html).
///
/// Bcc recipients go into the envelope only; lettre strips the header.
pub fn build_message(email: &RenderedEmail) -> NotificationResult<Message> {
    let from: Mailbox = parse_mailbox("From", &email.from)?;
    let to: Mailbox = parse_mailbox("To", &email.to)?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str());

    for cc in &email.cc {
        builder = builder.cc(parse_mailbox("Cc", cc)?);
    }

    for bcc in &email.bcc {
        builder = builder.bcc(parse_mailbox("Bcc", bcc)?);
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.plaintext.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html.clone()),
                ),
        )
        .map_err(|e| NotificationError::GeneralTransmission(format!("Failed to build email message: {}", e)))
}

fn parse_mailbox(header: &str, address: &str) -> NotificationResult<Mailbox> {
    address.parse().map_err(|e| {
        NotificationError::GeneralTransmission(format!("Invalid {} address '{}': {}", header, address, e))
    })
}
