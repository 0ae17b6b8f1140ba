//! Fetch window sizing.

use tracing::debug;

use crate::mail::{MailSession, TransportError};

/// Number of tail messages to fetch so that the unread tail is covered.
///
/// Starts at `base` and probes the oldest message of the window. While that
/// message is unread the window grows by a step that doubles on every probe;
/// the first read message ends the search. Only the single oldest message is
/// checked, so unread messages interleaved with read ones further back are
/// not found. The result never exceeds `total`.
///
/// # Errors
///
/// Returns the session's error if a flag probe fails.
pub async fn read_window(
    session: &mut dyn MailSession,
    total: u32,
    base: u32,
) -> Result<u32, TransportError> {
    let mut count = base.max(1);
    let mut step = 1u32;

    loop {
        if count >= total {
            return Ok(total);
        }

        let oldest = total - count + 1;
        if session.is_seen(oldest).await? {
            debug!(window = count, "Read window sized");
            return Ok(count);
        }

        step = step.saturating_mul(2);
        count = count.saturating_add(step);
    }
}
