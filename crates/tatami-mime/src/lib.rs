//! # tatami-mime
//!
//! Parses raw RFC 5322 letters far enough to answer three questions:
//! who sent it, what the subject says, and which attachments it carries.
//!
//! - Header unfolding and RFC 2047 encoded words
//! - `multipart/*` bodies, nested parts flattened into leaves
//! - Base64 and quoted-printable transfer encodings
//! - Attachment file names from `Content-Disposition` or `Content-Type`,
//!   including RFC 2231 `filename*=` values
//!
//! ```ignore
//! use tatami_mime::Message;
//!
//! let message = Message::parse(raw)?;
//! let sender = message.sender();
//! if let Some(sheet) = message.attachment_with_extension(".xlsx") {
//!     let bytes = sheet.decode_body()?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::normalize_address;
pub use content_type::{ContentType, parse_parameters};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
