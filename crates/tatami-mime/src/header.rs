//! Header block parsing.

use std::collections::HashMap;

use crate::encoding::decode_rfc2047;

/// Header fields of a message or part, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates an empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for `name`.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(name.into().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First raw value of `name`, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of `name` with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_rfc2047)
    }

    /// Number of distinct field names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no fields were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a header block, unfolding continuation lines.
    ///
    /// Parsing stops at the first empty line. Lines without a colon that are
    /// not continuations are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        headers
    }
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
    fn lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("subject"), None);
    }

    #[test]
    fn unfolds_continuations() {
        let text = concat!(
            "From: Coach <coach@example.com>\r\n",
            "Subject: =?UTF-8?B?0KHQvtGA0LXQsg==?=\r\n",
            "\t=?UTF-8?B?0L3QvtCy0LDQvdC40Y8=?= 01.02.2025\r\n",
            "Content-Type: multipart/mixed;\r\n",
            " boundary=\"b1\"\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text);
        assert_eq!(headers.get("from"), Some("Coach <coach@example.com>"));
        assert_eq!(
            headers.get_decoded("subject").unwrap(),
            "Соревнования 01.02.2025"
        );
        assert_eq!(
            headers.get("content-type"),
            Some("multipart/mixed; boundary=\"b1\"")
        );
        assert_eq!(headers.get("body"), None);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn repeated_fields_keep_first() {
        let headers = Headers::parse("Received: a\nReceived: b\n\n");
        assert_eq!(headers.get("received"), Some("a"));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let headers = Headers::parse("no colon here\nSubject: ok\n");
        assert_eq!(headers.get("subject"), Some("ok"));
        assert_eq!(headers.len(), 1);
    }
}
