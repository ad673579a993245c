//! SMTP protocol steps on top of lettre's low-level connection.

use super::smtp::{SmtpConfig, SmtpCredentials};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::Noop;
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Code;
use lettre::Message;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Opens SMTP sessions.
#[async_trait]
pub trait SmtpConnector: Send + Sync {
    type Session: SmtpSession;

    /// Connect and greet the relay. Bounded by `config.connect_timeout`.
    async fn connect(&self, config: &SmtpConfig) -> NotificationResult<Self::Session>;
}

/// One open SMTP session.
#[async_trait]
pub trait SmtpSession: Send {
    async fn starttls(&mut self) -> NotificationResult<()>;

    async fn login(&mut self, credentials: &SmtpCredentials) -> NotificationResult<()>;

    /// Issue NOOP and return the reply code.
    async fn noop(&mut self) -> NotificationResult<u16>;

    async fn send(&mut self, message: &Message) -> NotificationResult<()>;

    /// Release the connection. Must not fail.
    async fn close(&mut self);
}

/// Connector backed by `lettre::AsyncSmtpConnection` on tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreConnector;

#[async_trait]
impl SmtpConnector for LettreConnector {
    type Session = LettreSession;

    async fn connect(&self, config: &SmtpConfig) -> NotificationResult<LettreSession> {
        let hello_name = ClientId::Domain(config.hello_name.clone());
        let connect = AsyncSmtpConnection::connect_tokio1(
            (config.host.as_str(), config.port),
            config.connect_timeout,
            &hello_name,
            None::<TlsParameters>,
            None::<IpAddr>,
        );

        // lettre's own timeout covers the TCP connect; this also bounds
        // name resolution and the greeting.
        let result = match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                NotificationError::ConnectionAttempt(format!(
                    "timed out after {:?} connecting to {}:{}",
                    limit, config.host, config.port
                ))
            })?,
            None => connect.await,
        };

        let connection = result.map_err(|e| {
            NotificationError::ConnectionAttempt(format!(
                "{}:{}: {}",
                config.host, config.port, e
            ))
        })?;

        debug!(host = %config.host, port = config.port, "Connected to SMTP relay");

        Ok(LettreSession {
            connection,
            host: config.host.clone(),
            hello_name,
        })
    }
}

/// An open `AsyncSmtpConnection`.
pub struct LettreSession {
    connection: AsyncSmtpConnection,
    host: String,
    hello_name: ClientId,
}

#[async_trait]
impl SmtpSession for LettreSession {
    async fn starttls(&mut self) -> NotificationResult<()> {
        let parameters = TlsParameters::new(self.host.clone())
            .map_err(|e| NotificationError::GeneralTransmission(format!("TLS setup: {}", e)))?;

        self.connection
            .starttls(parameters, &self.hello_name)
            .await
            .map_err(|e| NotificationError::GeneralTransmission(format!("STARTTLS: {}", e)))
    }

    async fn login(&mut self, credentials: &SmtpCredentials) -> NotificationResult<()> {
        let credentials = Credentials::new(
            credentials.username().to_string(),
            credentials.password().to_string(),
        );

        match self
            .connection
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await
        {
            Ok(_) => Ok(()),
            // A status means the relay answered and refused us.
            Err(e) if e.status().is_some() => Err(NotificationError::FailedLogin(e.to_string())),
            Err(e) => Err(NotificationError::GeneralTransmission(format!("AUTH: {}", e))),
        }
    }

    async fn noop(&mut self) -> NotificationResult<u16> {
        match self.connection.command(Noop).await {
            Ok(response) => code_value(response.code()),
            Err(e) => match e.status() {
                Some(code) => code_value(code),
                None => Err(NotificationError::ServerPing(e.to_string())),
            },
        }
    }

    async fn send(&mut self, message: &Message) -> NotificationResult<()> {
        self.connection
            .send(message.envelope(), &message.formatted())
            .await
            .map(|_| ())
            .map_err(|e| NotificationError::GeneralTransmission(e.to_string()))
    }

    async fn close(&mut self) {
        if self.connection.has_broken() {
            self.connection.abort().await;
            return;
        }

        if let Err(e) = self.connection.quit().await {
            warn!(host = %self.host, error = %e, "QUIT failed, aborting connection");
            self.connection.abort().await;
        }
    }
}

fn code_value(code: Code) -> NotificationResult<u16> {
    code.to_string()
        .parse()
        .map_err(|_| NotificationError::ServerPing(format!("unreadable reply code {}", code)))
}
