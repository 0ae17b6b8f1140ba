//! Server replies.

use crate::error::{Error, Result};

/// A three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// `220` service ready.
    pub const SERVICE_READY: Self = Self(220);
    /// `221` closing channel.
    pub const CLOSING: Self = Self(221);
    /// `235` authentication succeeded.
    pub const AUTH_OK: Self = Self(235);
    /// `250` requested action completed.
    pub const OK: Self = Self(250);
    /// `354` start mail input.
    pub const START_DATA: Self = Self(354);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// True for 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

/// A complete, possibly multi-line, reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code.
    pub code: ReplyCode,
    /// Text of each line, without code and separator.
    pub lines: Vec<String>,
}

impl Reply {
    /// True for 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// All lines joined with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Turns a non-success reply into [`Error::Rejected`].
    pub(crate) fn expect_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub(crate) fn into_error(self) -> Error {
        Error::rejected(self.code.as_u16(), self.text())
    }
}

/// Parses the lines of one reply, e.g. `250-a`, `250-b`, `250 c`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on an empty reply, a bad code, or lines with
/// differing codes.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let first = lines
        .first()
        .ok_or_else(|| Error::Protocol("empty reply".into()))?;
    let code = reply_code(first)?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if reply_code(line)? != code {
            return Err(Error::Protocol(format!("mixed reply codes: {line}")));
        }
        text.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply {
        code: ReplyCode::new(code),
        lines: text,
    })
}

fn reply_code(line: &str) -> Result<u16> {
    line.get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid reply line: {line}")))
}

/// True if `line` ends a reply (`250 text` rather than `250-text`).
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || line.as_bytes().get(3) == Some(&b' ')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn multi_line_ehlo() {
        let reply = parse_reply(&lines(&["250-smtp.example.com", "250-STARTTLS", "250 AUTH PLAIN LOGIN"])).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.lines, vec!["smtp.example.com", "STARTTLS", "AUTH PLAIN LOGIN"]);
    }

    #[test]
    fn bare_code() {
        let reply = parse_reply(&lines(&["250"])).unwrap();
        assert_eq!(reply.lines, vec![""]);
        assert!(is_last_reply_line("250"));
    }

    #[test]
    fn last_line_detection() {
        assert!(is_last_reply_line("250 OK"));
        assert!(!is_last_reply_line("250-more"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&lines(&["OK"])).is_err());
        assert!(parse_reply(&lines(&["250-a", "251 b"])).is_err());
    }

    #[test]
    fn non_success_becomes_error() {
        let reply = parse_reply(&lines(&["550 5.1.1 no such user"])).unwrap();
        let err = reply.expect_success().unwrap_err();
        assert!(matches!(err, Error::Rejected { code: 550, .. }));
        assert!(!err.is_transient());
    }
}
