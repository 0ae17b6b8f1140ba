//! Mail plumbing: mailbox sessions in, reply letters out.

mod notify;
mod reply;
mod transport;

pub use notify::{Notifier, NotifyError, SmtpNotifier, SmtpSecurity};
pub use reply::{ReplyLetter, Report, compose_reply};
pub use transport::{
    ImapSession, ImapTransport, MailSession, MailTransport, MailboxCredentials, RawLetter,
    TransportError,
};
