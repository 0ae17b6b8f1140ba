//! # tatami-core
//!
//! Ingestion pipeline for competition registrations sent by email.
//!
//! A registration letter travels through these stages, one letter at a
//! time per mailbox:
//!
//! ```text
//! Mailbox Watcher → Letter Filter → Spreadsheet Classifier
//!                 → Category Resolver (Category Index) → Batch Persister → reply
//! ```
//!
//! This crate provides:
//! - **Dedup Ledger** - per-mailbox edit quota for resubmitted spreadsheets
//! - **Letter Filter** - subject, date and quota checks on fetched letters
//! - **Spreadsheet Classifier** - rows to participant records
//! - **Category Index / Resolver** - participant to category ids
//! - **Batch Persister** - row-independent inserts into `SQLite`
//! - **Mailbox Watcher** - polling state machine with reconnect policy
//! - **Supervisor** - one watcher task per mailbox, joined on shutdown

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod category;
mod error;
pub mod filter;
pub mod ledger;
pub mod mail;
pub mod registry;
pub mod sheet;
pub mod time;
pub mod watcher;

pub use category::{
    AGE_BINS, CategoryBin, CategoryIndex, CategoryRow, Discipline, IndexError, ResolveError, Sex,
    resolve,
};
pub use error::{Error, Result};
pub use filter::{FilterRules, LetterKind, RejectReason, Verdict, filter};
pub use ledger::{DEFAULT_EDIT_LIMIT, DedupKey, DedupLedger, HANDLED_LETTERS};
pub use mail::{
    ImapSession, ImapTransport, MailSession, MailTransport, MailboxCredentials, Notifier,
    NotifyError, RawLetter, ReplyLetter, Report, SmtpNotifier, SmtpSecurity, TransportError,
    compose_reply,
};
pub use registry::{
    NewParticipant, PersistError, RegistryRepository, RowFailure, StoredParticipant,
    UploadOutcome, persist,
};
pub use sheet::{
    ClassifiedSheet, ClassifyError, KataEntry, KumiteEntry, ParticipantRecord, RowError,
    SheetReader, XlsxReader, classify,
};
pub use time::{Clock, MockClock, SystemClock};
pub use watcher::{
    DEFAULT_MAILS_PER_REQUEST, LetterOutcome, Pipeline, PollPolicy, Supervisor, Watcher,
    WatcherError, WatcherFailure, WatcherState, read_window,
};
