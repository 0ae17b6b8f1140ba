//! Live reload of the base window size.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use tokio_util::sync::CancellationToken;

/// Re-reads the configuration on `SIGHUP` and publishes `mails_per_request`.
///
/// Every other setting needs a restart.
#[cfg(unix)]
pub fn spawn(path: PathBuf, mails_per_request: Arc<AtomicU32>, cancel: CancellationToken) {
    use std::sync::atomic::Ordering;

    use tokio::signal::unix::{SignalKind, signal};
    use tracing::{info, warn};

    use crate::settings::Settings;

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            warn!(error = %err, "Live reload unavailable");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match Settings::load(&path).await {
                        Ok(settings) => {
                            let value = settings.mail.mails_per_request;
                            mails_per_request.store(value, Ordering::Relaxed);
                            info!(mails_per_request = value, "Configuration reloaded");
                        }
                        Err(err) => warn!(error = %err, "Reload failed, keeping current settings"),
                    }
                }
            }
        }
    });
}

/// Live reload needs `SIGHUP`.
#[cfg(not(unix))]
pub fn spawn(_path: PathBuf, _mails_per_request: Arc<AtomicU32>, _cancel: CancellationToken) {
    tracing::debug!("Live reload is not available on this platform");
}
