//! Type-state IMAP client.
//!
//! `NotAuthenticated` → `login` → `Authenticated` → `select` → `Selected`.
//! Each state exposes only the commands valid in it.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};

use super::framed::FramedStream;
use crate::command::{Command, FetchItems, SeqRange, TagGenerator};
use crate::response::{FetchedMessage, Response, Status};
use crate::{Error, Result};

/// Freshly connected, greeting consumed.
#[derive(Debug, Clone, Copy)]
pub struct NotAuthenticated;

/// Logged in, no mailbox selected.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

/// A mailbox is selected.
#[derive(Debug, Clone)]
pub struct Selected {
    mailbox: String,
    exists: u32,
}

/// IMAP client whose connection state is tracked in its type.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tags", &self.tags)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn into_state<Next>(self, state: Next) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tags: self.tags,
            state,
        }
    }

    /// Sends a command and collects every response up to its tagged completion.
    ///
    /// Untagged `BYE` is surfaced as [`Error::Bye`]; tagged `NO`/`BAD` as
    /// [`Error::No`]/[`Error::Bad`].
    async fn execute(&mut self, command: &Command) -> Result<Vec<Response>> {
        let tag = self.tags.next_tag();
        tracing::trace!(tag = %tag, command = command.name(), "sending");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let mut responses = Vec::new();
        loop {
            let raw = self.stream.read_response().await?;
            match Response::parse(&raw)? {
                Response::Tagged {
                    tag: got,
                    status,
                    text,
                } if got == tag => {
                    return match status {
                        Status::Ok | Status::PreAuth => Ok(responses),
                        Status::No => Err(Error::No(text)),
                        Status::Bad => Err(Error::Bad(text)),
                        Status::Bye => Err(Error::Bye(text)),
                    };
                }
                Response::Untagged {
                    status: Status::Bye,
                    text,
                } if !matches!(command, Command::Logout) => return Err(Error::Bye(text)),
                other => responses.push(other),
            }
        }
    }

    /// Sends `NOOP`.
    pub async fn noop(&mut self) -> Result<()> {
        self.execute(&Command::Noop).await.map(drop)
    }

    /// Sends `LOGOUT` and closes the connection.
    pub async fn logout(mut self) -> Result<()> {
        self.execute(&Command::Logout).await?;
        self.stream.shutdown().await
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut stream = FramedStream::new(stream);
        let greeting = stream.read_response().await?;

        match Response::parse(&greeting)? {
            Response::Untagged {
                status: Status::Ok | Status::PreAuth,
                ..
            } => Ok(Self {
                stream,
                tags: TagGenerator::default(),
                state: NotAuthenticated,
            }),
            Response::Untagged {
                status: Status::Bye,
                text,
            } => Err(Error::Bye(text)),
            other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
        }
    }

    /// Logs in with a username and password.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.execute(&command).await {
            Ok(_) => Ok(self.into_state(Authenticated)),
            Err(Error::No(text)) => Err(Error::Auth(text)),
            Err(err) => Err(err),
        }
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox and records its message count.
    pub async fn select(mut self, mailbox: &str) -> Result<Client<S, Selected>> {
        let responses = self
            .execute(&Command::Select {
                mailbox: mailbox.to_string(),
            })
            .await?;

        let exists = responses
            .iter()
            .rev()
            .find_map(|r| match r {
                Response::Exists(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);

        Ok(self.into_state(Selected {
            mailbox: mailbox.to_string(),
            exists,
        }))
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Name of the selected mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.state.mailbox
    }

    /// Number of messages in the mailbox, as last reported by the server.
    #[must_use]
    pub const fn exists(&self) -> u32 {
        self.state.exists
    }

    /// Fetches `items` for every message in `range`, ordered by sequence number.
    pub async fn fetch(&mut self, range: SeqRange, items: FetchItems) -> Result<Vec<FetchedMessage>> {
        let responses = self.execute(&Command::Fetch { range, items }).await?;

        let mut messages: Vec<FetchedMessage> = Vec::with_capacity(range.len() as usize);
        for response in responses {
            match response {
                Response::Exists(n) => self.state.exists = n,
                Response::Fetch(message) => {
                    // Servers may split one message's data across several FETCH responses.
                    if let Some(existing) = messages.iter_mut().find(|m| m.seq == message.seq) {
                        if message.flags.is_some() {
                            existing.flags = message.flags;
                        }
                        if message.body.is_some() {
                            existing.body = message.body;
                        }
                    } else {
                        messages.push(message);
                    }
                }
                _ => {}
            }
        }

        messages.retain(|m| m.seq >= range.start() && m.seq <= range.end());
        messages.sort_by_key(|m| m.seq);
        Ok(messages)
    }
}
