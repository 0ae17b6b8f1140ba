//! SMTP commands.

use crate::address::Address;

/// Commands sent by the submission client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO hostname`.
    Ehlo(String),
    /// `STARTTLS`.
    StartTls,
    /// `AUTH PLAIN <base64>` with an initial response.
    AuthPlain(String),
    /// `MAIL FROM:<addr>`.
    MailFrom(Address),
    /// `RCPT TO:<addr>`.
    RcptTo(Address),
    /// `DATA`.
    Data,
    /// `RSET`.
    Rset,
    /// `QUIT`.
    Quit,
}

impl Command {
    /// Wire form including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo(hostname) => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::AuthPlain(initial) => format!("AUTH PLAIN {initial}"),
            Self::MailFrom(from) => format!("MAIL FROM:<{from}>"),
            Self::RcptTo(to) => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        let mut bytes = line.into_bytes();
        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    /// Verb for logging; never includes credentials.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::AuthPlain(_) => "AUTH",
            Self::MailFrom(_) => "MAIL",
            Self::RcptTo(_) => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }
}
