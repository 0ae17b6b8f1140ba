//! Mailbox access used by the watcher.

use std::fmt;

use async_trait::async_trait;
use tatami_imap::{Client, FetchItems, SeqRange, Selected, connect_tls};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Connection details for one mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxCredentials {
    /// IMAP server host.
    pub host: String,
    /// IMAP server port (implicit TLS).
    pub port: u16,
    /// Login name, also the address replies are sent from.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Mailbox access failures.
///
/// Everything except [`TransportError::Content`] is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not reach or talk to the server.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server refused the credentials.
    #[error("login rejected: {0}")]
    Login(String),

    /// Inbox could not be selected.
    #[error("mailbox unavailable: {0}")]
    Select(String),

    /// A fetch failed on the wire.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The server's answer did not contain a readable message.
    #[error("message content unreadable: {0}")]
    Content(String),
}

impl TransportError {
    /// True for connection-class failures.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Content(_))
    }

    fn fetch(err: tatami_imap::Error) -> Self {
        match err {
            tatami_imap::Error::Parse { .. } | tatami_imap::Error::Protocol(_) => {
                Self::Content(err.to_string())
            }
            other => Self::Fetch(other.to_string()),
        }
    }
}

/// One raw letter as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLetter {
    /// Sequence number in the mailbox.
    pub seq: u32,
    /// RFC 5322 bytes.
    pub raw: Vec<u8>,
}

/// An open, selected mailbox.
#[async_trait]
pub trait MailSession: Send {
    /// Messages in the mailbox.
    fn exists(&self) -> u32;

    /// Whether message `seq` carries `\Seen`. Does not change the flag.
    async fn is_seen(&mut self, seq: u32) -> Result<bool, TransportError>;

    /// Fetches messages `first..=last`. Marks them `\Seen`.
    async fn fetch_letters(
        &mut self,
        first: u32,
        last: u32,
    ) -> Result<Vec<RawLetter>, TransportError>;

    /// Ends the session.
    async fn logout(self: Box<Self>) -> Result<(), TransportError>;
}

/// Opens mailbox sessions.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Connects, logs in and selects the inbox.
    async fn connect(
        &self,
        mailbox: &MailboxCredentials,
    ) -> Result<Box<dyn MailSession>, TransportError>;
}

/// IMAP over implicit TLS.
#[derive(Debug, Clone)]
pub struct ImapTransport {
    mailbox: String,
}

impl ImapTransport {
    /// Watches the given mailbox name.
    #[must_use]
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
        }
    }
}

impl Default for ImapTransport {
    fn default() -> Self {
        Self::new("INBOX")
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn connect(
        &self,
        mailbox: &MailboxCredentials,
    ) -> Result<Box<dyn MailSession>, TransportError> {
        let connection = |e: tatami_imap::Error| TransportError::Connection(e.to_string());

        let stream = connect_tls(&mailbox.host, mailbox.port).await.map_err(connection)?;
        let client = Client::from_stream(stream).await.map_err(connection)?;
        let client = client
            .login(&mailbox.username, &mailbox.password)
            .await
            .map_err(|e| match e {
                tatami_imap::Error::Auth(_) | tatami_imap::Error::No(_) => {
                    TransportError::Login(e.to_string())
                }
                other => connection(other),
            })?;
        let client = client
            .select(&self.mailbox)
            .await
            .map_err(|e| TransportError::Select(e.to_string()))?;

        debug!(mailbox = %self.mailbox, exists = client.exists(), "Mailbox selected");
        Ok(Box::new(ImapSession::new(client)))
    }
}

/// A selected IMAP mailbox.
#[derive(Debug)]
pub struct ImapSession<S> {
    client: Client<S, Selected>,
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a client that has already selected a mailbox.
    #[must_use]
    pub const fn new(client: Client<S, Selected>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S> MailSession for ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn exists(&self) -> u32 {
        self.client.exists()
    }

    async fn is_seen(&mut self, seq: u32) -> Result<bool, TransportError> {
        let range = SeqRange::new(seq, seq).map_err(|e| TransportError::Fetch(e.to_string()))?;
        let fetched = self
            .client
            .fetch(range, FetchItems::Flags)
            .await
            .map_err(TransportError::fetch)?;

        // An expunged message answers nothing and counts as unread.
        Ok(fetched.first().is_some_and(tatami_imap::FetchedMessage::is_seen))
    }

    async fn fetch_letters(
        &mut self,
        first: u32,
        last: u32,
    ) -> Result<Vec<RawLetter>, TransportError> {
        let range = SeqRange::new(first, last).map_err(|e| TransportError::Fetch(e.to_string()))?;
        let fetched = self
            .client
            .fetch(range, FetchItems::Body)
            .await
            .map_err(TransportError::fetch)?;

        fetched
            .into_iter()
            .map(|message| {
                let raw = message.body.ok_or_else(|| {
                    TransportError::Content(format!("no body returned for message {}", message.seq))
                })?;
                Ok(RawLetter {
                    seq: message.seq,
                    raw,
                })
            })
            .collect()
    }

    async fn logout(self: Box<Self>) -> Result<(), TransportError> {
        self.client
            .logout()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    async fn session(mock: tokio_test::io::Mock) -> ImapSession<tokio_test::io::Mock> {
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("user", "pass").await.unwrap();
        ImapSession::new(client.select("INBOX").await.unwrap())
    }

    fn handshake(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* OK ready\r\n")
            .write(b"T0001 LOGIN user pass\r\n")
            .read(b"T0001 OK LOGIN completed\r\n")
            .write(b"T0002 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\n")
            .read(b"T0002 OK [READ-WRITE] SELECT completed\r\n")
    }

    #[tokio::test]
    async fn test_flags_and_bodies() {
        let mock = handshake(&mut Builder::new())
            .write(b"T0003 FETCH 2 FLAGS\r\n")
            .read(b"* 2 FETCH (FLAGS (\\Seen))\r\n")
            .read(b"T0003 OK FETCH completed\r\n")
            .write(b"T0004 FETCH 3 BODY[]\r\n")
            .read(b"* 3 FETCH (BODY[] {9}\r\n")
            .read(b"Subject: ")
            .read(b")\r\n")
            .read(b"T0004 OK FETCH completed\r\n")
            .build();

        let mut session = session(mock).await;
        assert_eq!(session.exists(), 3);
        assert!(session.is_seen(2).await.unwrap());

        let letters = session.fetch_letters(3, 3).await.unwrap();
        assert_eq!(
            letters,
            vec![RawLetter {
                seq: 3,
                raw: b"Subject: ".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_body_is_content_error() {
        let mock = handshake(&mut Builder::new())
            .write(b"T0003 FETCH 1 BODY[]\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen))\r\n")
            .read(b"T0003 OK FETCH completed\r\n")
            .build();

        let mut session = session(mock).await;
        let err = session.fetch_letters(1, 1).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = MailboxCredentials {
            host: "imap.example.com".into(),
            port: 993,
            username: "registrar@example.com".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("registrar@example.com"));
    }

    #[test]
    fn only_content_errors_are_terminal() {
        assert!(TransportError::Login("no".into()).is_retryable());
        assert!(TransportError::Fetch("io".into()).is_retryable());
        assert!(!TransportError::Content("garbled".into()).is_retryable());
    }
}
