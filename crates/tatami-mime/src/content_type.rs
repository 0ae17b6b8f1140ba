//! `Content-Type` and header parameter parsing.

use std::collections::{BTreeMap, HashMap};

use crate::encoding::{decode_rfc2047, percent_decode};
use crate::error::{Error, Result};

/// A parsed `type/subtype; key=value` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type, lowercase (`text`, `application`, `multipart`).
    pub main_type: String,
    /// Subtype, lowercase.
    pub sub_type: String,
    /// Parameters keyed by lowercase name.
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// `text/plain` with no parameters, the RFC 2045 default.
    #[must_use]
    pub fn text_plain() -> Self {
        Self {
            main_type: "text".to_string(),
            sub_type: "plain".to_string(),
            parameters: HashMap::new(),
        }
    }

    /// The `boundary` parameter.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// The `name` parameter, used by some clients instead of a
    /// `Content-Disposition` file name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// True for `multipart/*`.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Parses a `Content-Type` value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has no `type/subtype` pair.
    pub fn parse(value: &str) -> Result<Self> {
        let (mime, params) = value.split_once(';').unwrap_or((value, ""));
        let (main_type, sub_type) = mime
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(value.to_string()))?;

        let main_type = main_type.trim().to_ascii_lowercase();
        let sub_type = sub_type.trim().to_ascii_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(value.to_string()));
        }

        Ok(Self {
            main_type,
            sub_type,
            parameters: parse_parameters(params),
        })
    }
}

/// Parses `; key=value; key2="quoted; value"` parameter lists.
///
/// Handles quoted strings with backslash escapes, RFC 2231 extended values
/// (`key*=utf-8''%D0%90`) and continuations (`key*0=`, `key*1*=`), and
/// RFC 2047 encoded words inside plain values. Keys are lowercased.
#[must_use]
pub fn parse_parameters(input: &str) -> HashMap<String, String> {
    let mut plain = HashMap::new();
    // name -> (section -> (extended, raw value))
    let mut sections: HashMap<String, BTreeMap<u32, (bool, String)>> = HashMap::new();

    for (key, value) in split_parameters(input) {
        let (name, extended) = key
            .strip_suffix('*')
            .map_or((key.as_str(), false), |name| (name, true));

        if let Some((base, index)) = name.split_once('*')
            && let Ok(index) = index.parse::<u32>()
        {
            sections
                .entry(base.to_string())
                .or_default()
                .insert(index, (extended, value));
        } else if extended {
            sections
                .entry(name.to_string())
                .or_default()
                .insert(0, (true, value));
        } else {
            plain.insert(name.to_string(), decode_rfc2047(&value));
        }
    }

    for (name, parts) in sections {
        let mut bytes = Vec::new();
        for (index, (extended, raw)) in parts {
            if extended {
                // Only the first section carries charset'language'.
                let encoded = if index == 0 {
                    raw.splitn(3, '\'').nth(2).unwrap_or(&raw).to_string()
                } else {
                    raw
                };
                bytes.extend(percent_decode(&encoded));
            } else {
                bytes.extend(raw.into_bytes());
            }
        }
        plain.insert(name, String::from_utf8_lossy(&bytes).into_owned());
    }

    plain
}

/// Splits on `;` outside quotes and unquotes values.
fn split_parameters(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| *c == ';' || c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ';') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    _ => value.push(c),
                }
            }
            while chars.next_if(|c| *c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|c| *c != ';') {
                value.push(c);
            }
            value = value.trim_end().to_string();
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            out.push((key, value));
        }
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

    #[test]
    fn parses_type_and_boundary() {
        let ct = ContentType::parse("Multipart/Mixed; boundary=\"----=_Part_1;x\"").unwrap();
        assert_eq!(ct.main_type, "multipart");
        assert_eq!(ct.sub_type, "mixed");
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_1;x"));
    }

    #[test]
    fn rejects_missing_subtype() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn name_parameter_with_encoded_word() {
        let ct = ContentType::parse(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet; name=\"=?UTF-8?B?0JfQsC54bHN4?=\"",
        )
        .unwrap();
        assert_eq!(ct.name(), Some("За.xlsx"));
    }

    #[test]
    fn rfc2231_extended_value() {
        let params = parse_parameters("attachment; filename*=UTF-8''%D0%97%D0%B0.xlsx");
        assert_eq!(params.get("filename").map(String::as_str), Some("За.xlsx"));
    }

    #[test]
    fn rfc2231_continuations() {
        let params = parse_parameters(
            "attachment; filename*0*=utf-8''%D0%97; filename*1*=%D0%B0; filename*2=\".xlsx\"",
        );
        assert_eq!(params.get("filename").map(String::as_str), Some("За.xlsx"));
    }

    #[test]
    fn escaped_quotes() {
        let params = parse_parameters("a=\"x\\\"y\"; b = plain ");
        assert_eq!(params.get("a").map(String::as_str), Some("x\"y"));
        assert_eq!(params.get("b").map(String::as_str), Some("plain"));
    }
}
