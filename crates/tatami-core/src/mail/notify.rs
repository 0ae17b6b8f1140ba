//! Replies to the sender of a registration letter.

use async_trait::async_trait;
use serde::Deserialize;
use tatami_smtp::{Address, Client, OutgoingMessage, SmtpStream, connect, connect_tls};
use tracing::debug;

use super::reply::ReplyLetter;

/// Name announced in `EHLO`.
const CLIENT_NAME: &str = "tatami";

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with `STARTTLS`.
    #[default]
    StartTls,
    /// TLS from the first byte.
    Implicit,
}

/// Reply delivery failures. Never affect ingestion.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Recipient or sender address unusable.
    #[error("invalid address: {0}")]
    Address(String),

    /// SMTP dialogue failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] tatami_smtp::Error),
}

/// Delivers reply letters.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one reply.
    async fn send(&self, letter: &ReplyLetter) -> Result<(), NotifyError>;
}

/// Sends replies through an authenticated SMTP submission server.
#[derive(Clone)]
pub struct SmtpNotifier {
    host: String,
    port: u16,
    security: SmtpSecurity,
    username: String,
    password: String,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SmtpNotifier {
    /// Creates a notifier that logs in as `username` and sends from that address.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        security: SmtpSecurity,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            security,
            username: username.into(),
            password: password.into(),
        }
    }

    async fn open(&self) -> Result<Client<SmtpStream, tatami_smtp::Connected>, NotifyError> {
        let client = match self.security {
            SmtpSecurity::Implicit => {
                let stream = connect_tls(&self.host, self.port).await?;
                Client::from_stream(stream).await?.ehlo(CLIENT_NAME).await?
            }
            SmtpSecurity::StartTls => {
                let stream = connect(&self.host, self.port).await?;
                Client::from_stream(stream)
                    .await?
                    .ehlo(CLIENT_NAME)
                    .await?
                    .starttls(&self.host, CLIENT_NAME)
                    .await?
            }
        };
        Ok(client)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, letter: &ReplyLetter) -> Result<(), NotifyError> {
        let address = |e: tatami_smtp::Error| NotifyError::Address(e.to_string());
        let from = Address::new(self.username.as_str()).map_err(address)?;
        let to = Address::new(letter.to.as_str()).map_err(address)?;

        let mut message =
            OutgoingMessage::new(&self.username, &letter.to, &letter.subject, &letter.html);
        if let Some(parent) = &letter.in_reply_to {
            message = message.in_reply_to(parent);
        }

        let client = self.open().await?;
        let mut client = client.auth_plain(&self.username, &self.password).await?;
        client.send_mail(&from, &[to], &message.to_rfc5322()).await?;
        client.quit().await?;

        debug!(to = %letter.to, "Reply sent");
        Ok(())
    }
}
