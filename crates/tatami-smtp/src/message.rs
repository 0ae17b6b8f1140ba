//! Outgoing HTML letters.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tatami_mime::encoding::{encode_base64_wrapped, encode_rfc2047};

/// A single-part `text/html` letter.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject, encoded on output if not ASCII.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// `Message-ID` of the letter being answered.
    pub in_reply_to: Option<String>,
    /// Value of the `Date` header.
    pub date: DateTime<Utc>,
}

impl OutgoingMessage {
    /// Creates a letter dated now.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            in_reply_to: None,
            date: Utc::now(),
        }
    }

    /// Threads the letter under an earlier message.
    #[must_use]
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Renders RFC 5322 text with a Base64 UTF-8 body.
    #[must_use]
    pub fn to_rfc5322(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.html.len() * 4 / 3 + 512);

        let _ = write!(out, "From: {}\r\n", self.from);
        let _ = write!(out, "To: {}\r\n", self.to);
        let _ = write!(out, "Subject: {}\r\n", encode_rfc2047(&self.subject));
        let _ = write!(out, "Date: {}\r\n", self.date.to_rfc2822());
        let _ = write!(out, "Message-ID: {}\r\n", self.message_id());
        if let Some(parent) = &self.in_reply_to {
            let _ = write!(out, "In-Reply-To: {parent}\r\nReferences: {parent}\r\n");
        }
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Type: text/html; charset=utf-8\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str("\r\n");
        out.push_str(&encode_base64_wrapped(self.html.as_bytes()));

        out.into_bytes()
    }

    fn message_id(&self) -> String {
        let domain = self
            .from
            .rsplit_once('@')
            .map_or("localhost", |(_, domain)| domain);
        let nanos = self.date.timestamp_nanos_opt().unwrap_or_default();
        format!("<{nanos:x}.{:x}@{domain}>", std::process::id())
    }
}
