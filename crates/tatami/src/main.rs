//! `tatami` - registration mailbox service
//!
//! Watches registration mailboxes, stores participants from attached
//! spreadsheets and answers every registrar.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod reload;
mod settings;

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use anyhow::{Context, bail};
use tatami_core::{
    CategoryIndex, DedupLedger, ImapTransport, MailTransport, Pipeline, RegistryRepository,
    SmtpNotifier, Supervisor, Watcher,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tatami=info,tatami_core=info,tatami_imap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path =
        settings::config_path(std::env::args().skip(1), std::env::var("TATAMI_CONFIG").ok());
    let settings = Settings::load(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;
    info!(config = %path.display(), "Starting tatami");

    let database = &settings.database;
    let repo = RegistryRepository::connect(&database.url, database.max_connections)
        .await
        .context("opening registry database")?;
    let index = CategoryIndex::load(&repo)
        .await
        .context("building category index")?;
    info!(categories = index.len(), "Category index ready");

    let pipeline = Pipeline::new(repo, Arc::new(index)).with_rules(settings.filter.clone());
    let mails_per_request = Arc::new(AtomicU32::new(settings.mail.mails_per_request));
    let transport: Arc<dyn MailTransport> = Arc::new(ImapTransport::default());

    let watchers: Vec<Watcher> = settings
        .mailboxes()
        .into_iter()
        .map(|mailbox| {
            let notifier = Arc::new(SmtpNotifier::new(
                mailbox.smtp_host,
                settings.mail.smtp_port,
                settings.mail.smtp_security,
                mailbox.credentials.username.as_str(),
                mailbox.credentials.password.as_str(),
            ));
            Watcher::new(mailbox.credentials, pipeline.clone(), transport.clone(), notifier)
                .with_policy(settings.polling.policy())
                .with_ledger(DedupLedger::new(settings.polling.edit_limit))
                .with_mails_per_request(mails_per_request.clone())
        })
        .collect();

    let cancel = CancellationToken::new();
    let mut supervisor = Supervisor::start(watchers, cancel.clone());
    reload::spawn(path, mails_per_request, cancel);

    let mut failed = 0usize;
    let mut exhausted = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
            failure = supervisor.next_failure() => match failure {
                Some((mailbox, err)) => {
                    failed += 1;
                    error!(mailbox = %mailbox, error = %err, "Mailbox watcher stopped");
                }
                None => {
                    warn!("No mailbox watcher left");
                    exhausted = true;
                    break;
                }
            },
        }
    }

    supervisor.shutdown().await;

    if exhausted && failed > 0 {
        bail!("all mailbox watchers failed");
    }
    Ok(())
}
