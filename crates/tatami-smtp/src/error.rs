//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server answered with a non-success reply.
    #[error("SMTP error {code}: {message}")]
    Rejected {
        /// Reply code, e.g. 550.
        code: u16,
        /// Reply text.
        message: String,
    },

    /// Malformed or unexpected reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Address is not usable in an envelope.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Server lacks a required extension.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    pub(crate) fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// True for 4xx replies and I/O failures, which may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Rejected { code, .. } => *code >= 400 && *code < 500,
            _ => false,
        }
    }
}
