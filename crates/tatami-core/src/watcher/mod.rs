//! Mailbox Watcher and the supervisor that runs one per mailbox.

mod error;
mod mailbox;
mod pipeline;
mod supervisor;
mod window;

pub use error::WatcherError;
pub use mailbox::{DEFAULT_MAILS_PER_REQUEST, PollPolicy, Watcher, WatcherState};
pub use pipeline::{LetterOutcome, Pipeline};
pub use supervisor::{Supervisor, WatcherFailure};
pub use window::read_window;
