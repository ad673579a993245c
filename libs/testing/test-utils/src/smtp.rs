//! In-process SMTP relay for transmitter tests
//!
//! `TestSmtpServer` speaks just enough ESMTP for a real client session:
//! greeting, EHLO, AUTH PLAIN, NOOP, MAIL/RCPT/DATA and QUIT. It records
//! every session so tests can assert on what the client did.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A message accepted by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMail {
    /// Address from `MAIL FROM:<...>`
    pub mail_from: String,
    /// Addresses from every `RCPT TO:<...>`
    pub rcpt_to: Vec<String>,
    /// Message content between DATA and the terminating dot, dot-unstuffed
    pub data: String,
}

/// Everything the server observed, across all connections
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub connections: usize,
    pub auth_attempts: usize,
    pub noops: usize,
    pub quits: usize,
    pub commands: Vec<String>,
    pub messages: Vec<ReceivedMail>,
}

#[derive(Debug, Clone)]
struct ServerBehavior {
    credentials: Option<(String, String)>,
    noop_reply: (u16, String),
    rcpt_reply: (u16, String),
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            credentials: None,
            noop_reply: (250, "2.0.0 OK".to_string()),
            rcpt_reply: (250, "2.1.5 OK".to_string()),
        }
    }
}

/// Fake SMTP relay bound to a random local port
///
/// The accept loop is aborted when the server is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let server = TestSmtpServer::builder()
///     .with_credentials("user", "secret")
///     .start()
///     .await;
///
/// // point the client at server.host() / server.port()
///
/// let log = server.log().await;
/// assert_eq!(log.auth_attempts, 1);
/// assert_eq!(log.messages.len(), 1);
/// ```
pub struct TestSmtpServer {
    addr: SocketAddr,
    log: Arc<RwLock<SessionLog>>,
    handle: JoinHandle<()>,
}

impl TestSmtpServer {
    /// Builder for configuring server behavior
    pub fn builder() -> TestSmtpServerBuilder {
        TestSmtpServerBuilder::default()
    }

    /// Start a server without authentication and with default replies
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Snapshot of the session log
    pub async fn log(&self) -> SessionLog {
        self.log.read().await.clone()
    }

    /// Messages accepted so far
    pub async fn messages(&self) -> Vec<ReceivedMail> {
        self.log.read().await.messages.clone()
    }
}

impl Drop for TestSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::debug!(addr = %self.addr, "Stopped test SMTP server");
    }
}

/// Builder for `TestSmtpServer`
#[derive(Default)]
pub struct TestSmtpServerBuilder {
    behavior: ServerBehavior,
}

impl TestSmtpServerBuilder {
    /// Advertise AUTH and accept exactly this username/password
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.behavior.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Reply to NOOP with a custom status
    pub fn with_noop_reply(mut self, code: u16, message: &str) -> Self {
        self.behavior.noop_reply = (code, message.to_string());
        self
    }

    /// Reply to RCPT TO with a custom status
    pub fn with_rcpt_reply(mut self, code: u16, message: &str) -> Self {
        self.behavior.rcpt_reply = (code, message.to_string());
        self
    }

    /// Bind to 127.0.0.1 on a random port and start accepting connections
    pub async fn start(self) -> TestSmtpServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test SMTP server");
        let addr = listener.local_addr().expect("Failed to read local address");

        let log = Arc::new(RwLock::new(SessionLog::default()));
        let behavior = Arc::new(self.behavior);

        let accept_log = Arc::clone(&log);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let log = Arc::clone(&accept_log);
                let behavior = Arc::clone(&behavior);

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, behavior, log).await {
                        tracing::debug!(error = %e, "Test SMTP client error");
                    }
                });
            }
        });

        tracing::info!(%addr, "Test SMTP server ready");

        TestSmtpServer { addr, log, handle }
    }
}

fn reply(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}

/// Strip `<...>` and any ESMTP parameters from a MAIL/RCPT argument
fn path_address(argument: &str) -> String {
    let argument = argument.trim();
    let path = argument.split_whitespace().next().unwrap_or_default();
    path.trim_start_matches('<').trim_end_matches('>').to_string()
}

async fn handle_client(
    mut stream: TcpStream,
    behavior: Arc<ServerBehavior>,
    log: Arc<RwLock<SessionLog>>,
) -> std::io::Result<()> {
    log.write().await.connections += 1;

    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let mut mail_from: Option<String> = None;
    let mut rcpt_to: Vec<String> = Vec::new();

    writer
        .write_all(reply(220, "test.smtp.local ESMTP ready").as_bytes())
        .await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let command_line = line.trim_end().to_string();
        log.write().await.commands.push(command_line.clone());

        let (verb, argument) = match command_line.split_once(' ') {
            Some((verb, rest)) => (verb.to_ascii_uppercase(), rest.to_string()),
            None => (command_line.to_ascii_uppercase(), String::new()),
        };

        let response = match verb.as_str() {
            "EHLO" => {
                let mut response = String::from("250-test.smtp.local\r\n");
                if behavior.credentials.is_some() {
                    response.push_str("250-AUTH PLAIN LOGIN\r\n");
                }
                response.push_str("250 8BITMIME\r\n");
                response
            }
            "HELO" => reply(250, "test.smtp.local"),
            "AUTH" => {
                log.write().await.auth_attempts += 1;

                match &behavior.credentials {
                    None => reply(503, "5.5.1 Authentication not enabled"),
                    Some((username, password)) => {
                        let (mechanism, initial) = argument
                            .split_once(' ')
                            .map(|(m, i)| (m.to_ascii_uppercase(), i.trim().to_string()))
                            .unwrap_or_else(|| (argument.to_ascii_uppercase(), String::new()));

                        let expected = format!("\0{}\0{}", username, password);
                        let accepted = mechanism == "PLAIN"
                            && BASE64
                                .decode(initial.as_bytes())
                                .map(|decoded| decoded == expected.as_bytes())
                                .unwrap_or(false);

                        if accepted {
                            reply(235, "2.7.0 Authentication successful")
                        } else {
                            reply(535, "5.7.8 Authentication credentials invalid")
                        }
                    }
                }
            }
            "NOOP" => {
                log.write().await.noops += 1;
                reply(behavior.noop_reply.0, &behavior.noop_reply.1)
            }
            "RSET" => {
                mail_from = None;
                rcpt_to.clear();
                reply(250, "2.0.0 OK")
            }
            "MAIL" => {
                let address = argument
                    .split_once(':')
                    .map(|(_, path)| path_address(path))
                    .unwrap_or_default();
                mail_from = Some(address);
                rcpt_to.clear();
                reply(250, "2.1.0 OK")
            }
            "RCPT" => {
                let (code, message) = &behavior.rcpt_reply;
                if *code == 250 {
                    let address = argument
                        .split_once(':')
                        .map(|(_, path)| path_address(path))
                        .unwrap_or_default();
                    rcpt_to.push(address);
                }
                reply(*code, message)
            }
            "DATA" => {
                if mail_from.is_none() || rcpt_to.is_empty() {
                    reply(503, "5.5.1 Bad sequence of commands")
                } else {
                    writer
                        .write_all(reply(354, "End data with <CR><LF>.<CR><LF>").as_bytes())
                        .await?;

                    let data = read_data(&mut reader).await?;
                    log.write().await.messages.push(ReceivedMail {
                        mail_from: mail_from.take().unwrap_or_default(),
                        rcpt_to: std::mem::take(&mut rcpt_to),
                        data,
                    });

                    reply(250, "2.0.0 Message accepted")
                }
            }
            "QUIT" => {
                log.write().await.quits += 1;
                writer.write_all(reply(221, "2.0.0 Bye").as_bytes()).await?;
                writer.flush().await?;
                return Ok(());
            }
            _ => reply(502, "5.5.2 Command not implemented"),
        };

        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
}

async fn read_data<R>(reader: &mut R) -> std::io::Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut data = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }

        let content = line.trim_end_matches(['\r', '\n']);
        if content == "." {
            break;
        }

        let content = content.strip_prefix('.').unwrap_or(content);
        data.push_str(content);
        data.push_str("\r\n");
    }

    Ok(data)
}
