//! Mailbox Watcher: the polling loop of one mailbox.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pipeline::Pipeline;
use super::window::read_window;
use super::WatcherError;
use crate::ledger::DedupLedger;
use crate::mail::{MailSession, MailTransport, MailboxCredentials, Notifier, TransportError};

/// Letters requested per cycle when nothing else is configured.
pub const DEFAULT_MAILS_PER_REQUEST: u32 = 10;

/// Connection lifecycle of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Not connected.
    Disconnected,
    /// Opening a session.
    Connecting,
    /// Session open, inbox selected.
    Connected,
    /// Sizing the window and fetching letters.
    Fetching,
    /// Running letters through the pipeline.
    Processing,
    /// Waiting for the next poll.
    Sleeping,
    /// Waiting before another connection attempt.
    Reconnecting,
    /// Stopped on a terminal error.
    Failed,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Fetching => "fetching",
            Self::Processing => "processing",
            Self::Sleeping => "sleeping",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Timing and retry budget of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep after a successful cycle.
    pub poll_interval: Duration,
    /// Sleep after a failed cycle.
    pub reconnect_interval: Duration,
    /// Consecutive failed cycles before giving up.
    pub max_reconnects: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60 * 60),
            reconnect_interval: Duration::from_secs(10 * 60),
            max_reconnects: 5,
        }
    }
}

/// A failed cycle: either worth another attempt or the end of the watcher.
enum CycleError {
    Transport(TransportError),
    Terminal(WatcherError),
}

impl From<TransportError> for CycleError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<WatcherError> for CycleError {
    fn from(err: WatcherError) -> Self {
        Self::Terminal(err)
    }
}

/// Polls one mailbox and feeds its letters through a [`Pipeline`].
///
/// The watcher owns its mailbox's [`DedupLedger`]; nothing else reads or
/// writes it.
pub struct Watcher {
    credentials: MailboxCredentials,
    ledger: DedupLedger,
    pipeline: Pipeline,
    transport: Arc<dyn MailTransport>,
    notifier: Arc<dyn Notifier>,
    policy: PollPolicy,
    mails_per_request: Arc<AtomicU32>,
    state: WatcherState,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("credentials", &self.credentials)
            .field("ledger", &self.ledger.len())
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a watcher with the default policy and an empty ledger.
    #[must_use]
    pub fn new(
        credentials: MailboxCredentials,
        pipeline: Pipeline,
        transport: Arc<dyn MailTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            credentials,
            ledger: DedupLedger::default(),
            pipeline,
            transport,
            notifier,
            policy: PollPolicy::default(),
            mails_per_request: Arc::new(AtomicU32::new(DEFAULT_MAILS_PER_REQUEST)),
            state: WatcherState::Disconnected,
        }
    }

    /// Replaces the polling policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the ledger, e.g. to change the edit limit.
    #[must_use]
    pub fn with_ledger(mut self, ledger: DedupLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Shares the base window size; read at the start of every cycle.
    #[must_use]
    pub fn with_mails_per_request(mut self, mails_per_request: Arc<AtomicU32>) -> Self {
        self.mails_per_request = mails_per_request;
        self
    }

    /// Mailbox login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> WatcherState {
        self.state
    }

    /// Submissions accepted so far.
    #[must_use]
    pub const fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Polls until cancelled or a terminal error occurs.
    ///
    /// Cancellation is checked between cycles and during sleeps; a cycle
    /// already in progress always finishes.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::RetriesExhausted`] after
    /// [`PollPolicy::max_reconnects`] consecutive failed cycles, and
    /// [`WatcherError::Content`] or [`WatcherError::Storage`] immediately.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), WatcherError> {
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = match self.cycle().await {
                Ok(()) => {
                    attempts = 0;
                    self.transition(WatcherState::Sleeping);
                    self.policy.poll_interval
                }
                Err(CycleError::Transport(err)) if err.is_retryable() => {
                    attempts += 1;
                    warn!(
                        attempt = attempts,
                        max = self.policy.max_reconnects,
                        error = %err,
                        "Mailbox cycle failed"
                    );
                    if attempts >= self.policy.max_reconnects {
                        self.transition(WatcherState::Failed);
                        return Err(WatcherError::from_transport(err, attempts));
                    }
                    self.transition(WatcherState::Reconnecting);
                    self.policy.reconnect_interval
                }
                Err(CycleError::Transport(err)) => {
                    self.transition(WatcherState::Failed);
                    return Err(WatcherError::from_transport(err, attempts));
                }
                Err(CycleError::Terminal(err)) => {
                    self.transition(WatcherState::Failed);
                    return Err(err);
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }

        self.transition(WatcherState::Disconnected);
        info!("Watcher stopped");
        Ok(())
    }

    async fn cycle(&mut self) -> Result<(), CycleError> {
        self.transition(WatcherState::Connecting);
        let mut session = self.transport.connect(&self.credentials).await?;
        self.transition(WatcherState::Connected);

        let result = self.drain(session.as_mut()).await;

        if let Err(err) = session.logout().await {
            debug!(error = %err, "Logout failed");
        }
        result
    }

    async fn drain(&mut self, session: &mut dyn MailSession) -> Result<(), CycleError> {
        let total = session.exists();
        if total == 0 {
            debug!("Mailbox is empty");
            return Ok(());
        }

        self.transition(WatcherState::Fetching);
        let base = self.mails_per_request.load(Ordering::Relaxed);
        let window = read_window(session, total, base).await?;
        let letters = session.fetch_letters(total - window + 1, total).await?;
        info!(window, fetched = letters.len(), "Letters fetched");

        // Fetched letters are already marked seen; the whole batch is processed.
        self.transition(WatcherState::Processing);
        for letter in &letters {
            self.pipeline
                .process(letter, &mut self.ledger, self.notifier.as_ref())
                .await?;
        }
        Ok(())
    }

    fn transition(&mut self, next: WatcherState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Watcher state");
            self.state = next;
        }
    }
}
