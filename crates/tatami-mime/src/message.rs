//! Letter structure: headers plus a flat list of leaf parts.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::address::normalize_address;
use crate::content_type::{ContentType, parse_parameters};
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Deepest `multipart` nesting that is unpacked.
const MAX_NESTING: usize = 8;

/// `Content-Transfer-Encoding` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `7bit`, also the default.
    SevenBit,
    /// `8bit`.
    EightBit,
    /// `binary`.
    Binary,
    /// `base64`.
    Base64,
    /// `quoted-printable`.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses a header value; unknown values fall back to `7bit`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
        })
    }
}

/// A leaf body part with its own headers and still-encoded body.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Body bytes as they appeared on the wire.
    pub body: Vec<u8>,
}

impl Part {
    /// The part's content type, `text/plain` when absent or unparseable.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// The part's transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Attachment file name from `Content-Disposition` or the `name`
    /// parameter of `Content-Type`.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let from_disposition = self.headers.get("content-disposition").and_then(|value| {
            let params = value.split_once(';').map_or("", |(_, rest)| rest);
            parse_parameters(params).remove("filename")
        });

        from_disposition
            .or_else(|| self.content_type().name().map(str::to_string))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Decodes the body according to its transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if a Base64 or quoted-printable body is malformed.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&self.body),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(&self.body),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Ok(self.body.clone())
            }
        }
    }
}

/// A parsed letter.
#[derive(Debug, Clone)]
pub struct Message {
    /// Top-level headers.
    pub headers: Headers,
    /// Leaf parts in document order. A single-part letter has exactly one.
    pub parts: Vec<Part>,
}

impl Message {
    /// Parses a raw RFC 5322 letter.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart body lacks its boundary or contains
    /// no delimiter line for it.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (header_bytes, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes));

        let mut parts = Vec::new();
        collect_parts(headers.clone(), body, 0, &mut parts)?;

        Ok(Self { headers, parts })
    }

    /// Decoded `Subject`, or an empty string when missing.
    #[must_use]
    pub fn subject(&self) -> String {
        self.headers.get_decoded("subject").unwrap_or_default()
    }

    /// Normalized sender address from `From`.
    #[must_use]
    pub fn sender(&self) -> Option<String> {
        self.headers
            .get_decoded("from")
            .as_deref()
            .and_then(normalize_address)
    }

    /// `Date` as an RFC 2822 timestamp, or `None` when missing or unparseable.
    ///
    /// A trailing comment such as `(UTC)` is ignored.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        let value = self.headers.get("date")?;
        let value = value.split_once('(').map_or(value, |(stamp, _)| stamp).trim();
        DateTime::parse_from_rfc2822(value).ok()
    }

    /// `Message-ID`, if present.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Parts that carry a file name.
    pub fn attachments(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|part| part.filename().is_some())
    }

    /// First attachment whose file name ends with `extension`, case-insensitively.
    #[must_use]
    pub fn attachment_with_extension(&self, extension: &str) -> Option<&Part> {
        let extension = extension.to_lowercase();
        self.attachments().find(|part| {
            part.filename()
                .is_some_and(|name| name.to_lowercase().ends_with(&extension))
        })
    }
}

fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    // A part may have no headers at all.
    if let Some(body) = raw.strip_prefix(b"\r\n").or_else(|| raw.strip_prefix(b"\n")) {
        return (&[], body);
    }

    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = raw.windows(2).position(|w| w == b"\n\n");

    match (crlf, lf) {
        (Some(c), Some(l)) if l < c => (&raw[..l], &raw[l + 2..]),
        (Some(c), _) => (&raw[..c], &raw[c + 4..]),
        (None, Some(l)) => (&raw[..l], &raw[l + 2..]),
        (None, None) => (raw, &[]),
    }
}

fn collect_parts(headers: Headers, body: &[u8], depth: usize, out: &mut Vec<Part>) -> Result<()> {
    let content_type = headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok());

    let Some(content_type) = content_type.filter(|ct| ct.is_multipart() && depth < MAX_NESTING)
    else {
        out.push(Part {
            headers,
            body: body.to_vec(),
        });
        return Ok(());
    };

    let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
    for section in split_multipart(body, boundary)? {
        let (part_headers, part_body) = split_header_body(section);
        let part_headers = Headers::parse(&String::from_utf8_lossy(part_headers));
        collect_parts(part_headers, part_body, depth + 1, out)?;
    }
    Ok(())
}

/// Returns the body sections between `--boundary` delimiter lines.
///
/// The preamble and epilogue are dropped. A missing closing delimiter is
/// tolerated; the last section then runs to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut sections = Vec::new();
    let mut open: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let next = (line_end + 1).min(body.len());
        let line = body[pos..line_end]
            .strip_suffix(b"\r")
            .unwrap_or(&body[pos..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest.starts_with(b"--");
            if closing || rest.iter().all(u8::is_ascii_whitespace) {
                if let Some(start) = open.take() {
                    sections.push(trim_line_break(&body[start..pos]));
                }
                if closing {
                    return Ok(sections);
                }
                open = Some(next);
            }
        }

        pos = next;
    }

    match open {
        Some(start) => {
            sections.push(&body[start..]);
            Ok(sections)
        }
        None if sections.is_empty() => Err(Error::InvalidMultipart(format!(
            "no delimiter for boundary {boundary}"
        ))),
        None => Ok(sections),
    }
}

/// Strips the line break that belongs to the following delimiter.
fn trim_line_break(section: &[u8]) -> &[u8] {
    section
        .strip_suffix(b"\r\n")
        .or_else(|| section.strip_suffix(b"\n"))
        .unwrap_or(section)
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

    const LETTER: &str = concat!(
        "From: =?UTF-8?B?0JfQsA==?= <Coach@Dojo.org>\r\n",
        "Subject: Competition 01.02.2025\r\n",
        "Date: Tue, 14 Jan 2025 09:30:00 +0300\r\n",
        "Message-ID: <abc@dojo.org>\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
        "\r\n",
        "This is a multi-part message.\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=inner\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "Content-Transfer-Encoding: quoted-printable\r\n",
        "\r\n",
        "=D0=97=D0=B0=D1=8F=D0=B2=D0=BA=D0=B0\r\n",
        "--inner\r\n",
        "Content-Type: text/html\r\n",
        "\r\n",
        "<p>hi</p>\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: application/pdf; name=rules.pdf\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERg==\r\n",
        "--outer\r\n",
        "Content-Type: application/vnd.openxmlformats-officedocument.spreadsheetml.sheet\r\n",
        "Content-Disposition: attachment; filename=\"Team.XLSX\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "UEsDBA==\r\n",
        "--outer\r\n",
        "Content-Disposition: attachment; filename=\"second.xlsx\"\r\n",
        "\r\n",
        "ignored\r\n",
        "--outer--\r\n",
        "epilogue\r\n"
    );

    #[test]
    fn parses_nested_multipart() {
        let message = Message::parse(LETTER.as_bytes()).unwrap();
        assert_eq!(message.parts.len(), 5);
        assert_eq!(message.subject(), "Competition 01.02.2025");
        assert_eq!(message.sender().as_deref(), Some("coach@dojo.org"));
        assert_eq!(message.message_id(), Some("<abc@dojo.org>"));

        let text = message.parts[0].decode_body().unwrap();
        assert_eq!(String::from_utf8(text).unwrap(), "Заявка");
        assert_eq!(message.parts[1].body, b"<p>hi</p>");
    }

    #[test]
    fn finds_first_xlsx_attachment() {
        let message = Message::parse(LETTER.as_bytes()).unwrap();
        assert_eq!(message.attachments().count(), 3);

        let sheet = message.attachment_with_extension(".xlsx").unwrap();
        assert_eq!(sheet.filename().as_deref(), Some("Team.XLSX"));
        assert_eq!(sheet.decode_body().unwrap(), b"PK\x03\x04");
    }

    #[test]
    fn single_part_letter() {
        let raw = b"From: a@b.c\nSubject: hello\n\nbody line\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].body, b"body line\n");
        assert!(message.attachment_with_extension(".xlsx").is_none());
    }

    #[test]
    fn reads_date_header() {
        let message = Message::parse(LETTER.as_bytes()).unwrap();
        let date = message.date().unwrap();
        assert_eq!(date.to_rfc3339(), "2025-01-14T09:30:00+03:00");

        let commented =
            Message::parse(b"Date: Tue, 14 Jan 2025 06:30:00 +0000 (UTC)\r\n\r\n").unwrap();
        assert_eq!(commented.date(), Some(date));
    }

    #[test]
    fn missing_or_garbled_date_is_none() {
        let missing = Message::parse(b"From: a@b.c\r\n\r\n").unwrap();
        assert_eq!(missing.date(), None);

        let garbled = Message::parse(b"Date: yesterday\r\n\r\n").unwrap();
        assert_eq!(garbled.date(), None);
    }

    #[test]
    fn missing_subject_is_empty() {
        let message = Message::parse(b"From: a@b.c\r\n\r\n").unwrap();
        assert_eq!(message.subject(), "");
    }

    #[test]
    fn multipart_without_boundary_fails() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\n--x\r\n\r\nbody\r\n";
        assert!(matches!(Message::parse(raw), Err(Error::MissingBoundary)));
    }

    #[test]
    fn multipart_without_delimiters_fails() {
        let raw = b"Content-Type: multipart/mixed; boundary=x\r\n\r\nno parts here\r\n";
        assert!(matches!(
            Message::parse(raw),
            Err(Error::InvalidMultipart(_))
        ));
    }

    #[test]
    fn unterminated_multipart_keeps_last_part() {
        let raw = b"Content-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\nContent-Disposition: attachment; filename=a.xlsx\r\n\r\ndata";
        let message = Message::parse(raw).unwrap();
        let part = message.attachment_with_extension("xlsx").unwrap();
        assert_eq!(part.body, b"data");
    }

    #[test]
    fn transfer_encoding_names() {
        assert_eq!(TransferEncoding::parse(" Base64 "), TransferEncoding::Base64);
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }
}
