//! Error types for MIME parsing.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header block could not be separated from the body.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Content-Type value could not be parsed.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Quoted-printable or encoded-word data was malformed.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 payload was malformed.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// A multipart body without its boundary parameter.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// No delimiter line for the declared boundary was found.
    #[error("Invalid multipart structure: {0}")]
    InvalidMultipart(String),
}
