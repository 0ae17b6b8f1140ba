//! Transfer and header encodings.
//!
//! Decoders are lenient: letters come from many different mail clients and
//! a slightly malformed header should not cost a registration.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Line length used when wrapping Base64 bodies.
const BASE64_LINE: usize = 76;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-terminated lines of 76 characters.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

/// Decodes Base64, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the remaining characters are not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes quoted-printable bytes (RFC 2045).
///
/// Soft line breaks (`=` at end of line) are removed.
///
/// # Errors
///
/// Returns an error on a truncated or non-hex escape.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }

        match (data.get(i + 1), data.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => {
                let byte = hex_value(hi)
                    .zip(hex_value(lo))
                    .map(|(h, l)| (h << 4) | l)
                    .ok_or_else(|| {
                        Error::InvalidEncoding(format!(
                            "invalid escape ={}{}",
                            char::from(hi),
                            char::from(lo)
                        ))
                    })?;
                out.push(byte);
                i += 3;
            }
            // Trailing '=' with nothing after it is a soft break at end of input.
            (None, _) => i += 1,
            (Some(_), None) => {
                return Err(Error::InvalidEncoding(
                    "incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(out)
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Encodes a header value as a UTF-8 Base64 encoded word if it is not plain ASCII.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.bytes().all(|b| (0x20..0x7F).contains(&b)) && !text.contains("=?") {
        return text.to_string();
    }
    format!("=?UTF-8?B?{}?=", encode_base64(text.as_bytes()))
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Words that
/// fail to decode are kept verbatim. Non-UTF-8 payloads are decoded lossily.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            flush_literal(&mut out, &mut pending_space, rest);
            break;
        };

        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_word(candidate) {
            if last_was_word && before.trim().is_empty() {
                pending_space.clear();
            } else {
                flush_literal(&mut out, &mut pending_space, before);
            }
            out.push_str(&decoded);
            last_was_word = true;
            rest = &candidate[consumed..];

            let ws_len = rest.len() - rest.trim_start().len();
            pending_space.push_str(&rest[..ws_len]);
            rest = &rest[ws_len..];
        } else {
            flush_literal(&mut out, &mut pending_space, before);
            out.push_str("=?");
            last_was_word = false;
            rest = &candidate[2..];
        }
    }

    out
}

fn flush_literal(out: &mut String, pending_space: &mut String, literal: &str) {
    out.push_str(pending_space);
    pending_space.clear();
    out.push_str(literal);
}

/// Decodes one `=?charset?enc?text?=` word at the start of `input`.
/// Returns the decoded text and the number of bytes consumed.
fn decode_word(input: &str) -> Option<(String, usize)> {
    let body = input.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let payload = &body[..end];
    if charset.is_empty() || payload.contains(' ') {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => {
            let spaced: Vec<u8> = payload
                .bytes()
                .map(|b| if b == b'_' { b' ' } else { b })
                .collect();
            decode_quoted_printable(&spaced).ok()?
        }
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((String::from_utf8_lossy(&bytes).into_owned(), consumed))
}

/// Decodes `%XX` escapes as used by RFC 2231 parameter values.
#[must_use]
pub fn percent_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2))
            && let (Some(h), Some(l)) = (hex_value(hi), hex_value(lo))
        {
            out.push((h << 4) | l);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
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
    use proptest::prelude::*;

    #[test]
    fn base64_ignores_line_breaks() {
        assert_eq!(decode_base64(b"SGVs\r\nbG8=\r\n").unwrap(), b"Hello");
        assert!(decode_base64(b"***").is_err());
    }

    #[test]
    fn base64_wrapping() {
        let wrapped = encode_base64_wrapped(&[0u8; 100]);
        let lines: Vec<&str> = wrapped.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(decode_base64(wrapped.as_bytes()).unwrap(), vec![0u8; 100]);
    }

    #[test]
    fn quoted_printable_decodes_utf8() {
        let decoded = decode_quoted_printable(b"=D0=9B=D0=B8=D1=81=D1=82 1").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Лист 1");
    }

    #[test]
    fn quoted_printable_soft_breaks() {
        assert_eq!(decode_quoted_printable(b"ab=\r\ncd=\nef=").unwrap(), b"abcdef");
        assert!(decode_quoted_printable(b"=ZZ").is_err());
    }

    #[test]
    fn rfc2047_single_words() {
        assert_eq!(decode_rfc2047("plain subject"), "plain subject");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_rfc2047("=?UTF-8?Q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn rfc2047_adjacent_words_join() {
        let encoded = "=?UTF-8?B?0KHQvtGA0LXQsg==?= =?UTF-8?B?0L3QvtCy0LDQvdC40Y8=?= 01.02.2025";
        assert_eq!(decode_rfc2047(encoded), "Соревнования 01.02.2025");
    }

    #[test]
    fn rfc2047_mixed_with_plain_text() {
        assert_eq!(decode_rfc2047("Re: =?utf-8?Q?caf=C3=A9?= now"), "Re: café now");
    }

    #[test]
    fn rfc2047_malformed_kept_verbatim() {
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047("price =? unknown"), "price =? unknown");
    }

    #[test]
    fn rfc2047_encode_only_when_needed() {
        assert_eq!(encode_rfc2047("Re: Competition"), "Re: Competition");
        let encoded = encode_rfc2047("Re: Соревнования");
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert_eq!(decode_rfc2047(&encoded), "Re: Соревнования");
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("%D0%97%D0%B0.xlsx"), "За.xlsx".as_bytes());
        assert_eq!(percent_decode("100%"), b"100%");
    }

    proptest! {
        #[test]
        fn rfc2047_encode_decode_any_text(text in "\\PC{0,40}") {
            prop_assert_eq!(decode_rfc2047(&encode_rfc2047(&text)), text);
        }
    }
}
