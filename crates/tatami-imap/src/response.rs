//! Response parsing.
//!
//! Handles the handful of response shapes a polling client sees: status
//! responses, `EXISTS`, and `FETCH` with `FLAGS` and `BODY[]`. Anything
//! else parses as [`Response::Other`] and is ignored by the client.

use crate::{Error, Result};

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `OK`.
    Ok,
    /// `NO`.
    No,
    /// `BAD`.
    Bad,
    /// `PREAUTH` (greeting only).
    PreAuth,
    /// `BYE`.
    Bye,
}

impl Status {
    fn parse(word: &[u8]) -> Option<Self> {
        match word.to_ascii_uppercase().as_slice() {
            b"OK" => Some(Self::Ok),
            b"NO" => Some(Self::No),
            b"BAD" => Some(Self::Bad),
            b"PREAUTH" => Some(Self::PreAuth),
            b"BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// A message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`.
    Seen,
    /// `\Answered`.
    Answered,
    /// `\Flagged`.
    Flagged,
    /// `\Deleted`.
    Deleted,
    /// `\Draft`.
    Draft,
    /// `\Recent`.
    Recent,
    /// Any other system flag or keyword, verbatim.
    Keyword(String),
}

impl Flag {
    /// Parses a flag from its wire form.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\answered" => Self::Answered,
            "\\flagged" => Self::Flagged,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            "\\recent" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }
}

/// Data returned for one message by `FETCH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Message sequence number.
    pub seq: u32,
    /// Flags, if `FLAGS` was requested.
    pub flags: Option<Vec<Flag>>,
    /// Raw RFC 5322 message, if `BODY[]` was requested.
    pub body: Option<Vec<u8>>,
}

impl FetchedMessage {
    /// Returns true if the message carries `\Seen`.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags
            .as_ref()
            .is_some_and(|flags| flags.contains(&Flag::Seen))
    }
}

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `tag STATUS text`.
    Tagged {
        /// Command tag.
        tag: String,
        /// Completion status.
        status: Status,
        /// Human-readable text.
        text: String,
    },
    /// `* STATUS text`.
    Untagged {
        /// Status.
        status: Status,
        /// Human-readable text.
        text: String,
    },
    /// `* n EXISTS`.
    Exists(u32),
    /// `* n FETCH (...)`.
    Fetch(FetchedMessage),
    /// `+ text`.
    Continuation(String),
    /// Anything else.
    Other,
}

impl Response {
    /// Parses one complete response (including any literals and the final CRLF).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the response is malformed.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(input);

        if cursor.eat(b'+') {
            cursor.eat(b' ');
            return Ok(Self::Continuation(cursor.rest_of_line()));
        }

        if cursor.eat(b'*') {
            cursor.expect(b' ')?;
            return parse_untagged(&mut cursor);
        }

        let tag = cursor.atom()?;
        cursor.expect(b' ')?;
        let word = cursor.atom()?;
        let status = Status::parse(word.as_bytes())
            .ok_or_else(|| Error::parse(cursor.pos, format!("unknown status {word}")))?;
        cursor.eat(b' ');
        Ok(Self::Tagged {
            tag,
            status,
            text: cursor.rest_of_line(),
        })
    }
}

fn parse_untagged(cursor: &mut Cursor<'_>) -> Result<Response> {
    let first = cursor.atom()?;

    if let Some(status) = Status::parse(first.as_bytes()) {
        cursor.eat(b' ');
        return Ok(Response::Untagged {
            status,
            text: cursor.rest_of_line(),
        });
    }

    let Ok(number) = first.parse::<u32>() else {
        return Ok(Response::Other);
    };
    cursor.expect(b' ')?;
    let keyword = cursor.atom()?.to_ascii_uppercase();

    match keyword.as_str() {
        "EXISTS" => Ok(Response::Exists(number)),
        "FETCH" => {
            cursor.expect(b' ')?;
            parse_fetch(cursor, number).map(Response::Fetch)
        }
        _ => Ok(Response::Other),
    }
}

fn parse_fetch(cursor: &mut Cursor<'_>, seq: u32) -> Result<FetchedMessage> {
    let mut message = FetchedMessage {
        seq,
        ..FetchedMessage::default()
    };

    cursor.expect(b'(')?;
    loop {
        cursor.skip_spaces();
        if cursor.eat(b')') {
            break;
        }

        let name = cursor.fetch_item_name()?.to_ascii_uppercase();
        cursor.skip_spaces();

        match name.as_str() {
            "FLAGS" => message.flags = Some(cursor.flag_list()?),
            "BODY[]" | "RFC822" => message.body = cursor.nstring()?,
            _ => cursor.skip_value()?,
        }
    }

    Ok(message)
}

/// Byte cursor over a single response.
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(Error::parse(
                self.pos,
                format!("expected '{}'", char::from(byte)),
            ))
        }
    }

    fn skip_spaces(&mut self) {
        while self.eat(b' ') {}
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        let input = self.input;
        &input[start..self.pos]
    }

    fn atom(&mut self) -> Result<String> {
        let bytes = self.take_while(is_atom_char);
        if bytes.is_empty() {
            return Err(Error::parse(self.pos, "expected atom"));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// A fetch item name such as `FLAGS`, `BODY[]` or `BODY[HEADER.FIELDS (FROM)]`.
    fn fetch_item_name(&mut self) -> Result<String> {
        let start = self.pos;
        self.take_while(is_atom_char);
        if self.eat(b'[') {
            let mut depth = 1_u32;
            while depth > 0 {
                match self.peek() {
                    Some(b'[') => depth += 1,
                    Some(b']') => depth -= 1,
                    Some(_) => {}
                    None => return Err(Error::parse(self.pos, "unterminated section")),
                }
                self.pos += 1;
            }
            // Partial fetch suffix, e.g. <0>.
            if self.eat(b'<') {
                self.take_while(|b| b != b'>');
                self.expect(b'>')?;
            }
        }
        if self.pos == start {
            return Err(Error::parse(self.pos, "expected fetch item"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn flag_list(&mut self) -> Result<Vec<Flag>> {
        self.expect(b'(')?;
        let mut flags = Vec::new();
        loop {
            self.skip_spaces();
            if self.eat(b')') {
                return Ok(flags);
            }
            let raw = self.take_while(|b| b != b' ' && b != b')' && b != b'\r');
            if raw.is_empty() {
                return Err(Error::parse(self.pos, "unterminated flag list"));
            }
            flags.push(Flag::parse(&String::from_utf8_lossy(raw)));
        }
    }

    /// `NIL`, a quoted string, or a literal.
    fn nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.peek() {
            Some(b'"') => self.quoted().map(Some),
            Some(b'{') => self.literal().map(Some),
            _ => {
                let atom = self.atom()?;
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(None)
                } else {
                    Err(Error::parse(self.pos, format!("expected string, got {atom}")))
                }
            }
        }
    }

    fn quoted(&mut self) -> Result<Vec<u8>> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| Error::parse(self.pos, "unterminated escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
                None => return Err(Error::parse(self.pos, "unterminated quoted string")),
            }
        }
    }

    fn literal(&mut self) -> Result<Vec<u8>> {
        self.expect(b'{')?;
        let digits = self.take_while(|b| b.is_ascii_digit());
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::parse(self.pos, "invalid literal length"))?;
        self.eat(b'+');
        self.expect(b'}')?;
        self.expect(b'\r')?;
        self.expect(b'\n')?;

        let end = self.pos + len;
        let data = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| Error::parse(self.pos, "literal shorter than announced"))?;
        self.pos = end;
        Ok(data.to_vec())
    }

    /// Skips any single value: atom, number, string, literal or list.
    fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'"') => self.quoted().map(drop),
            Some(b'{') => self.literal().map(drop),
            Some(b'(') => {
                self.pos += 1;
                loop {
                    self.skip_spaces();
                    if self.eat(b')') {
                        return Ok(());
                    }
                    if self.peek().is_none() {
                        return Err(Error::parse(self.pos, "unterminated list"));
                    }
                    self.skip_value()?;
                }
            }
            Some(_) => {
                let skipped = self.take_while(|b| is_atom_char(b) || b == b'\\');
                if skipped.is_empty() {
                    return Err(Error::parse(self.pos, "unexpected byte"));
                }
                Ok(())
            }
            None => Err(Error::parse(self.pos, "unexpected end of response")),
        }
    }

    fn rest_of_line(&mut self) -> String {
        let rest = &self.input[self.pos..];
        self.pos = self.input.len();
        String::from_utf8_lossy(rest).trim_end().to_string()
    }
}

const fn is_atom_char(b: u8) -> bool {
    !matches!(b, b' ' | b'(' | b')' | b'{' | b'"' | b'[' | b']' | b'\r' | b'\n') && b > 0x1F
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_ok() {
        let response = Response::parse(b"T0001 OK LOGIN completed\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: "T0001".into(),
                status: Status::Ok,
                text: "LOGIN completed".into(),
            }
        );
    }

    #[test]
    fn parses_greeting_and_bye() {
        assert!(matches!(
            Response::parse(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").unwrap(),
            Response::Untagged {
                status: Status::Ok,
                ..
            }
        ));
        assert!(matches!(
            Response::parse(b"* BYE shutting down\r\n").unwrap(),
            Response::Untagged {
                status: Status::Bye,
                ..
            }
        ));
    }

    #[test]
    fn parses_exists() {
        assert_eq!(
            Response::parse(b"* 42 EXISTS\r\n").unwrap(),
            Response::Exists(42)
        );
        assert_eq!(Response::parse(b"* 0 RECENT\r\n").unwrap(), Response::Other);
    }

    #[test]
    fn parses_fetch_flags() {
        let response = Response::parse(b"* 12 FETCH (FLAGS (\\Seen \\Answered $Junk))\r\n").unwrap();
        let Response::Fetch(message) = response else {
            panic!("expected fetch");
        };
        assert_eq!(message.seq, 12);
        assert!(message.is_seen());
        assert_eq!(
            message.flags.unwrap(),
            vec![Flag::Seen, Flag::Answered, Flag::Keyword("$Junk".into())]
        );
    }

    #[test]
    fn parses_fetch_body_literal() {
        let raw = b"* 3 FETCH (UID 99 FLAGS () BODY[] {11}\r\nSubject: x\n RFC822.SIZE 11)\r\n";
        let Response::Fetch(message) = Response::parse(raw).unwrap() else {
            panic!("expected fetch");
        };
        assert_eq!(message.seq, 3);
        assert!(!message.is_seen());
        assert_eq!(message.body.unwrap(), b"Subject: x\n");
    }

    #[test]
    fn skips_unknown_items() {
        let raw = b"* 1 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" ENVELOPE (NIL \"a\" (1 2)) FLAGS (\\Seen))\r\n";
        let Response::Fetch(message) = Response::parse(raw).unwrap() else {
            panic!("expected fetch");
        };
        assert!(message.is_seen());
        assert!(message.body.is_none());
    }

    #[test]
    fn nil_body_is_none() {
        let Response::Fetch(message) = Response::parse(b"* 1 FETCH (BODY[] NIL)\r\n").unwrap()
        else {
            panic!("expected fetch");
        };
        assert!(message.body.is_none());
    }

    #[test]
    fn rejects_truncated_literal() {
        let raw = b"* 1 FETCH (BODY[] {50}\r\nshort)\r\n";
        assert!(Response::parse(raw).is_err());
    }

    #[test]
    fn continuation() {
        assert_eq!(
            Response::parse(b"+ go ahead\r\n").unwrap(),
            Response::Continuation("go ahead".into())
        );
    }
}
