//! Envelope addresses.

use std::fmt;

use crate::error::{Error, Result};

/// An address usable in `MAIL FROM` / `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates `local@domain` without whitespace or angle brackets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] otherwise.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let valid = address
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            })
            && !address
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>'));

        if valid {
            Ok(Self(address))
        } else {
            Err(Error::InvalidAddress(address))
        }
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
