//! Terminal watcher errors.

use crate::mail::TransportError;

/// Why a watcher stopped for good.
///
/// Retryable transport failures never surface here until the reconnect
/// budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// Every reconnect attempt failed.
    #[error("giving up after {attempts} failed attempts: {last}")]
    RetriesExhausted {
        /// Consecutive failed cycles.
        attempts: u32,
        /// The last failure.
        #[source]
        last: TransportError,
    },

    /// A fetched message could not be read at all.
    #[error("unreadable message: {0}")]
    Content(String),

    /// The registry database failed.
    #[error("storage failure: {0}")]
    Storage(#[source] crate::Error),
}

impl WatcherError {
    /// Terminal form of a transport failure.
    pub(crate) fn from_transport(err: TransportError, attempts: u32) -> Self {
        if err.is_retryable() {
            Self::RetriesExhausted {
                attempts,
                last: err,
            }
        } else {
            Self::Content(err.to_string())
        }
    }
}
