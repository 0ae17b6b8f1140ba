//! One task per mailbox, with a shared channel for terminal errors.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use super::{Watcher, WatcherError};

/// A watcher that stopped for good, with its mailbox name.
pub type WatcherFailure = (String, WatcherError);

/// Runs watchers side by side until shutdown.
#[derive(Debug)]
pub struct Supervisor {
    tasks: JoinSet<()>,
    failures: mpsc::Receiver<WatcherFailure>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Spawns every watcher on the current runtime.
    ///
    /// Each watcher reports at most one terminal error, so the channel is
    /// sized to the number of watchers and a report never waits.
    #[must_use]
    pub fn start(watchers: Vec<Watcher>, cancel: CancellationToken) -> Self {
        let (sender, failures) = mpsc::channel(watchers.len().max(1));
        let mut tasks = JoinSet::new();

        for mut watcher in watchers {
            let sender = sender.clone();
            let cancel = cancel.clone();
            let mailbox = watcher.username().to_string();
            let span = info_span!("mailbox", mailbox = %mailbox);

            tasks.spawn(
                async move {
                    info!("Watcher started");
                    if let Err(err) = watcher.run(cancel).await {
                        error!(error = %err, "Watcher failed");
                        if sender.try_send((mailbox, err)).is_err() {
                            warn!("Failure channel closed");
                        }
                    }
                }
                .instrument(span),
            );
        }

        info!(watchers = tasks.len(), "Supervisor started");
        Self {
            tasks,
            failures,
            cancel,
        }
    }

    /// Watcher tasks not yet joined.
    #[must_use]
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for the next watcher to fail.
    ///
    /// Returns `None` once every watcher has stopped and all reports were read.
    pub async fn next_failure(&mut self) -> Option<WatcherFailure> {
        self.failures.recv().await
    }

    /// Cancels every watcher and waits for all of them to stop.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined
                && err.is_panic()
            {
                error!(error = %err, "Watcher panicked");
            }
        }
        info!("Supervisor stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::category::{CategoryBin, CategoryIndex, CategoryRow, Discipline, Sex};
    use crate::mail::{
        MailSession, MailTransport, MailboxCredentials, Notifier, NotifyError, ReplyLetter,
        TransportError,
    };
    use crate::registry::RegistryRepository;
    use crate::watcher::{Pipeline, PollPolicy};

    struct Unreachable;

    #[async_trait]
    impl MailTransport for Unreachable {
        async fn connect(
            &self,
            _mailbox: &MailboxCredentials,
        ) -> Result<Box<dyn MailSession>, TransportError> {
            Err(TransportError::Connection("unreachable".into()))
        }
    }

    struct Silent;

    #[async_trait]
    impl Notifier for Silent {
        async fn send(&self, _letter: &ReplyLetter) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    async fn watcher(
        username: &str,
        max_reconnects: u32,
        reconnect_interval: Duration,
    ) -> Watcher {
        let repo = RegistryRepository::in_memory().await.unwrap();
        let index = CategoryIndex::build([CategoryRow {
            id: 1,
            discipline: Discipline::Kata,
            sex: Sex::Mixed,
            age: CategoryBin::new(10, 12),
            kyu: None,
            weight: None,
            group_kata: false,
        }])
        .unwrap();
        let credentials = MailboxCredentials {
            host: "imap.example.com".into(),
            port: 993,
            username: username.into(),
            password: "secret".into(),
        };
        Watcher::new(
            credentials,
            Pipeline::new(repo, Arc::new(index)),
            Arc::new(Unreachable),
            Arc::new(Silent),
        )
        .with_policy(PollPolicy {
            max_reconnects,
            reconnect_interval,
            ..PollPolicy::default()
        })
    }

    #[tokio::test]
    async fn test_reports_failed_mailbox() {
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::start(
            vec![
                watcher("a@example.com", 2, Duration::from_millis(1)).await,
                watcher("b@example.com", 5, Duration::from_secs(600)).await,
            ],
            cancel,
        );

        let (mailbox, err) = supervisor.next_failure().await.unwrap();
        assert_eq!(mailbox, "a@example.com");
        assert!(matches!(err, WatcherError::RetriesExhausted { attempts: 2, .. }));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_sleeping_watchers() {
        let cancel = CancellationToken::new();
        let watchers = vec![watcher("a@example.com", 5, Duration::from_secs(600)).await];
        let supervisor = Supervisor::start(watchers, cancel.clone());
        assert_eq!(supervisor.running(), 1);

        supervisor.shutdown().await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_no_watchers_no_failures() {
        let mut supervisor = Supervisor::start(Vec::new(), CancellationToken::new());
        assert!(supervisor.next_failure().await.is_none());
    }
}
