//! # tatami-smtp
//!
//! SMTP submission client used to answer registration letters.
//!
//! ```text
//! Connected ── ehlo() ──→ Connected ── starttls() ──→ Connected ── auth_plain() ──→ Authenticated
//!                                                                                     │
//!                                                                   send_mail() ←─────┘
//! ```
//!
//! ```ignore
//! use tatami_smtp::{Address, Client, OutgoingMessage, connect};
//!
//! let stream = connect("smtp.example.com", 587).await?;
//! let client = Client::from_stream(stream).await?.ehlo("tatami").await?;
//! let client = client.starttls("smtp.example.com").await?;
//! let mut client = client.auth_plain("registrar@example.com", "secret").await?;
//!
//! let message = OutgoingMessage::new("registrar@example.com", "coach@example.com", "Re: Competition", "<p>ok</p>");
//! client
//!     .send_mail(&Address::new("registrar@example.com")?, &[Address::new("coach@example.com")?], &message.to_rfc5322())
//!     .await?;
//! client.quit().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod client;
mod command;
mod error;
mod message;
mod reply;
mod stream;

pub use address::Address;
pub use client::{Authenticated, Client, Connected, ServerInfo};
pub use command::Command;
pub use error::{Error, Result};
pub use message::OutgoingMessage;
pub use reply::{Reply, ReplyCode, is_last_reply_line, parse_reply};
pub use stream::{SmtpStream, connect, connect_tls};

/// Default submission port (STARTTLS).
pub const SUBMISSION_PORT: u16 = 587;

/// Default implicit-TLS submission port.
pub const SUBMISSIONS_PORT: u16 = 465;
