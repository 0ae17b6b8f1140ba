//! IMAP commands and their wire form.

use crate::{Error, Result};

/// Generates command tags in the form `T0001`, `T0002`, ...
#[derive(Debug, Clone)]
pub struct TagGenerator {
    prefix: char,
    counter: u32,
}

impl TagGenerator {
    /// Creates a generator using the given tag prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { prefix, counter: 0 }
    }

    /// Returns the next tag. Wraps around after `u32::MAX` commands.
    pub fn next_tag(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, self.counter)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('T')
    }
}

/// An inclusive range of message sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    start: u32,
    end: u32,
}

impl SeqRange {
    /// Creates `start:end`. Sequence numbers start at 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `start` is zero or greater than `end`.
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start == 0 || start > end {
            return Err(Error::InvalidArgument(format!(
                "invalid sequence range {start}:{end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// First sequence number.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Last sequence number.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// Number of messages covered.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one message.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    fn write(self, buf: &mut Vec<u8>) {
        if self.start == self.end {
            buf.extend_from_slice(self.start.to_string().as_bytes());
        } else {
            buf.extend_from_slice(format!("{}:{}", self.start, self.end).as_bytes());
        }
    }
}

/// What to fetch for each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchItems {
    /// `FLAGS` only. Does not change the `\Seen` flag.
    Flags,
    /// `BODY[]`, the whole raw message. Marks the message `\Seen`.
    Body,
    /// `(FLAGS BODY[])`.
    FlagsAndBody,
}

impl FetchItems {
    const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Flags => b"FLAGS",
            Self::Body => b"BODY[]",
            Self::FlagsAndBody => b"(FLAGS BODY[])",
        }
    }
}

/// The commands this client knows how to send.
#[derive(Debug, Clone)]
pub enum Command {
    /// `LOGIN user pass`.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// `SELECT mailbox`.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// `FETCH range items`.
    Fetch {
        /// Messages to fetch.
        range: SeqRange,
        /// Data items per message.
        items: FetchItems,
    },
    /// `NOOP`.
    Noop,
    /// `LOGOUT`.
    Logout,
}

impl Command {
    /// Serializes the command with the given tag, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }
            Self::Fetch { range, items } => {
                buf.extend_from_slice(b"FETCH ");
                range.write(&mut buf);
                buf.push(b' ');
                buf.extend_from_slice(items.as_bytes());
            }
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Command name for logging. Never includes credentials.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Fetch { .. } => "FETCH",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
        }
    }
}

/// Writes an atom when possible, otherwise a quoted string.
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if !s.is_empty() && !s.bytes().any(needs_quoting) {
        buf.extend_from_slice(s.as_bytes());
        return;
    }

    buf.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']')
        || b < 0x20
        || b >= 0x7F
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sequential() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next_tag(), "T0001");
        assert_eq!(tags.next_tag(), "T0002");
    }

    #[test]
    fn login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "registrar@example.com".into(),
            password: "pa ss\"word".into(),
        };
        assert_eq!(
            cmd.serialize("T0001"),
            b"T0001 LOGIN registrar@example.com \"pa ss\\\"word\"\r\n"
        );
    }

    #[test]
    fn fetch_single_and_range() {
        let single = Command::Fetch {
            range: SeqRange::new(7, 7).unwrap(),
            items: FetchItems::Flags,
        };
        assert_eq!(single.serialize("T0003"), b"T0003 FETCH 7 FLAGS\r\n");

        let range = Command::Fetch {
            range: SeqRange::new(3, 9).unwrap(),
            items: FetchItems::Body,
        };
        assert_eq!(range.serialize("T0004"), b"T0004 FETCH 3:9 BODY[]\r\n");
    }

    #[test]
    fn seq_range_rejects_zero_and_inverted() {
        assert!(SeqRange::new(0, 4).is_err());
        assert!(SeqRange::new(5, 4).is_err());
        assert_eq!(SeqRange::new(2, 4).unwrap().len(), 3);
    }

    #[test]
    fn command_name_hides_credentials() {
        let cmd = Command::Login {
            username: "u".into(),
            password: "p".into(),
        };
        assert_eq!(cmd.name(), "LOGIN");
    }
}
