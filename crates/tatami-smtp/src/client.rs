//! Type-state SMTP client.

use std::collections::HashSet;
use std::marker::PhantomData;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::address::Address;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::reply::{Reply, ReplyCode, is_last_reply_line, parse_reply};
use crate::stream::SmtpStream;

/// Longest reply line accepted.
const MAX_REPLY_LINE: usize = 4096;

/// Greeting read; `EHLO`/`STARTTLS` allowed.
#[derive(Debug)]
pub struct Connected;

/// Logged in; mail may be submitted.
#[derive(Debug)]
pub struct Authenticated;

/// What the server announced about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Host name from the greeting.
    pub hostname: String,
    /// EHLO keywords, uppercase (`STARTTLS`, `AUTH`, `8BITMIME`, ...).
    pub extensions: HashSet<String>,
    /// Mechanisms listed after `AUTH`, uppercase.
    pub auth_mechanisms: HashSet<String>,
}

impl ServerInfo {
    /// True if `STARTTLS` was advertised.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.extensions.contains("STARTTLS")
    }

    fn update_from_ehlo(&mut self, reply: &Reply) {
        self.extensions.clear();
        self.auth_mechanisms.clear();
        for line in reply.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            let keyword = keyword.to_ascii_uppercase();
            if keyword == "AUTH" {
                self.auth_mechanisms
                    .extend(words.map(str::to_ascii_uppercase));
            }
            self.extensions.insert(keyword);
        }
    }
}

/// SMTP client whose protocol state is tracked in its type.
#[derive(Debug)]
pub struct Client<S, State> {
    stream: BufReader<S>,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn into_state<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    /// Server information gathered so far.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    async fn send(&mut self, command: &Command) -> Result<Reply> {
        tracing::trace!(verb = command.verb(), "smtp command");
        self.write(&command.serialize()).await?;
        self.read_reply().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = (&mut self.stream)
                .take(MAX_REPLY_LINE as u64)
                .read_line(&mut line)
                .await?;
            if read == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if line.is_empty() {
                continue;
            }
            let last = is_last_reply_line(&line);
            lines.push(line);
            if last {
                return parse_reply(&lines);
            }
        }
    }

    /// Sends `QUIT`. A `221` or any 2xx reply counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a non-success reply.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send(&Command::Quit).await?;
        if reply.code == ReplyCode::CLOSING || reply.is_success() {
            Ok(())
        } else {
            Err(reply.into_error())
        }
    }
}

impl<S> Client<S, Connected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing or not `220`.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            stream: BufReader::new(stream),
            server_info: ServerInfo::default(),
            _state: PhantomData,
        };

        let greeting = client.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(greeting.into_error());
        }
        client.server_info.hostname = greeting
            .lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(client)
    }

    /// Sends `EHLO` and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-success reply.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .send(&Command::Ehlo(client_hostname.to_string()))
            .await?
            .expect_success()?;
        self.server_info.update_from_ehlo(&reply);
        Ok(self)
    }

    /// Authenticates with `AUTH PLAIN`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server did not offer PLAIN, or
    /// [`Error::Rejected`] if the credentials were refused.
    pub async fn auth_plain(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        if !self.server_info.auth_mechanisms.is_empty()
            && !self.server_info.auth_mechanisms.contains("PLAIN")
        {
            return Err(Error::NotSupported("AUTH PLAIN".into()));
        }

        let initial = STANDARD.encode(format!("\0{username}\0{password}"));
        let reply = self.send(&Command::AuthPlain(initial)).await?;
        if reply.code != ReplyCode::AUTH_OK {
            return Err(reply.into_error());
        }
        Ok(self.into_state())
    }
}

impl Client<SmtpStream, Connected> {
    /// Issues `STARTTLS`, upgrades the stream and repeats `EHLO`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is missing, refused, or the
    /// handshake fails.
    pub async fn starttls(mut self, hostname: &str, client_hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        self.send(&Command::StartTls).await?.expect_success()?;

        let stream = self.stream.into_inner().upgrade_to_tls(hostname).await?;
        let client = Self {
            stream: BufReader::new(stream),
            server_info: self.server_info,
            _state: PhantomData,
        };
        client.ehlo(client_hostname).await
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Submits one message: `MAIL`, `RCPT` per recipient, `DATA`.
    ///
    /// Line endings are normalized to CRLF and leading dots are stuffed.
    ///
    /// # Errors
    ///
    /// Returns an error if any step is refused. The transaction is reset
    /// with `RSET` before returning a refusal.
    pub async fn send_mail(&mut self, from: &Address, to: &[Address], message: &[u8]) -> Result<()> {
        if to.is_empty() {
            return Err(Error::InvalidAddress("no recipients".into()));
        }

        if let Err(err) = self.envelope(from, to).await {
            if matches!(err, Error::Rejected { .. }) {
                let _ = self.send(&Command::Rset).await;
            }
            return Err(err);
        }

        self.write(&dot_stuff(message)).await?;
        self.read_reply().await?.expect_success()?;
        Ok(())
    }

    async fn envelope(&mut self, from: &Address, to: &[Address]) -> Result<()> {
        self.send(&Command::MailFrom(from.clone()))
            .await?
            .expect_success()?;
        for recipient in to {
            self.send(&Command::RcptTo(recipient.clone()))
                .await?
                .expect_success()?;
        }
        let reply = self.send(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(reply.into_error());
        }
        Ok(())
    }
}

/// CRLF-normalizes, dot-stuffs and terminates message data.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 16);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b".\r\n");
    out
}
