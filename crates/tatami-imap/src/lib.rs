//! # tatami-imap
//!
//! A deliberately small IMAP4 client: just enough protocol to poll an
//! inbox for registration letters.
//!
//! ## Supported commands
//!
//! - `LOGIN` with a plain username and password
//! - `SELECT` of a single mailbox (normally `INBOX`)
//! - `FETCH` of `FLAGS` and/or `BODY[]` over a sequence range
//! - `LOGOUT`
//!
//! Fetching `BODY[]` (not `BODY.PEEK[]`) makes the server set `\Seen`,
//! which is how processed letters drop out of the unread tail.
//!
//! ## Connection states
//!
//! ```text
//! ┌──────────────────┐
//! │ NotAuthenticated │ ─── login() ───→ Authenticated ─── select() ───→ Selected
//! └──────────────────┘
//! ```
//!
//! ```ignore
//! use tatami_imap::{Client, FetchItems, SeqRange, connect_tls};
//!
//! let stream = connect_tls("imap.example.com", 993).await?;
//! let client = Client::from_stream(stream).await?;
//! let client = client.login("registrar@example.com", "secret").await?;
//! let mut inbox = client.select("INBOX").await?;
//! let last = inbox.exists();
//! let fetched = inbox.fetch(SeqRange::new(last, last)?, FetchItems::Flags).await?;
//! inbox.logout().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod response;

pub use command::{Command, FetchItems, SeqRange, TagGenerator};
pub use connection::{
    Authenticated, Client, FramedStream, ImapStream, NotAuthenticated, Selected, connect_plain,
    connect_tls,
};
pub use error::{Error, Result};
pub use response::{FetchedMessage, Flag, Response, Status};

/// Default port for IMAP over implicit TLS.
pub const IMAPS_PORT: u16 = 993;
