//! Connection handling: TLS/plaintext streams, CRLF framing with literal
//! support, and the type-state client.

mod client;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use framed::FramedStream;
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};
