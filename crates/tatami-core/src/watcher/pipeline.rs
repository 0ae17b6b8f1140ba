//! Per-letter processing: filter, classify, persist, reply.

use std::sync::Arc;

use tatami_mime::Message;
use tracing::{debug, info, warn};

use super::WatcherError;
use crate::category::CategoryIndex;
use crate::filter::{FilterRules, LetterKind, RejectReason, Verdict, filter};
use crate::ledger::DedupLedger;
use crate::mail::{Notifier, RawLetter, Report, compose_reply};
use crate::registry::{PersistError, RegistryRepository, UploadOutcome, persist};
use crate::sheet::{MAX_ERROR_PERCENT, SheetReader, XlsxReader, classify};
use crate::time::{Clock, SystemClock};

/// What happened to one letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LetterOutcome {
    /// The filter turned the letter away; the sender is not told.
    Skipped(RejectReason),
    /// The spreadsheet was refused as a whole; the sender was told why.
    Refused(String),
    /// The spreadsheet was persisted, possibly with failed rows.
    Uploaded(UploadOutcome),
}

/// Everything a watcher needs to turn a raw letter into stored participants.
///
/// Cheap to clone; all watchers share the same repository, index and reader.
#[derive(Clone)]
pub struct Pipeline {
    repo: RegistryRepository,
    index: Arc<CategoryIndex>,
    reader: Arc<dyn SheetReader>,
    rules: FilterRules,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("categories", &self.index.len())
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline reading `.xlsx` attachments with default rules.
    #[must_use]
    pub fn new(repo: RegistryRepository, index: Arc<CategoryIndex>) -> Self {
        Self {
            repo,
            index,
            reader: Arc::new(XlsxReader::default()),
            rules: FilterRules::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the spreadsheet reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn SheetReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Replaces the subject keywords.
    #[must_use]
    pub fn with_rules(mut self, rules: FilterRules) -> Self {
        self.rules = rules;
        self
    }

    /// Replaces the clock used for date checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Processes one letter and answers its sender.
    ///
    /// The quota in the ledger is only spent after the spreadsheet was
    /// persisted. Every answered letter is marked handled, so a refetch of
    /// it is skipped. Reply failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Content`] if the letter is not a parseable
    /// message, or [`WatcherError::Storage`] if the database fails while
    /// looking up the competition.
    pub async fn process(
        &self,
        letter: &RawLetter,
        ledger: &mut DedupLedger,
        notifier: &dyn Notifier,
    ) -> Result<LetterOutcome, WatcherError> {
        let message = Message::parse(&letter.raw)
            .map_err(|e| WatcherError::Content(format!("message {}: {e}", letter.seq)))?;

        let (letter_id, key, kind, spreadsheet) =
            match filter(&message, ledger, &self.rules, self.clock.today()) {
                Verdict::Accept {
                    letter_id,
                    key,
                    kind,
                    spreadsheet,
                } => (letter_id, key, kind, spreadsheet),
                Verdict::Reject(RejectReason::AlreadyHandled) => {
                    debug!(seq = letter.seq, "Letter already handled");
                    return Ok(LetterOutcome::Skipped(RejectReason::AlreadyHandled));
                }
                Verdict::Reject(reason) => {
                    info!(seq = letter.seq, reason = %reason, "Letter skipped");
                    return Ok(LetterOutcome::Skipped(reason));
                }
            };
        debug!(seq = letter.seq, sender = %key.sender, ?kind, "Letter accepted");

        let sheet = match self.reader.read_rows(&spreadsheet).and_then(|rows| classify(&rows)) {
            Ok(sheet) => sheet,
            Err(err) => {
                warn!(sender = %key.sender, error = %err, "Spreadsheet refused");
                ledger.mark_handled(&letter_id);
                return Ok(refuse(notifier, &message, &key.sender, err.to_string()).await);
            }
        };

        if !sheet.is_acceptable() {
            warn!(
                sender = %key.sender,
                error_percent = sheet.error_percent,
                "Spreadsheet refused"
            );
            let reason = format!(
                "{:.0} % of rows have errors, at most {MAX_ERROR_PERCENT:.0} % are allowed",
                sheet.error_percent
            );
            ledger.mark_handled(&letter_id);
            return Ok(refuse(notifier, &message, &key.sender, reason).await);
        }

        let outcome =
            match persist(&self.repo, &self.index, &sheet.participants, &sheet.submission_id)
                .await
            {
                Ok(outcome) => outcome,
                Err(PersistError::CompetitionNotFound(id)) => {
                    warn!(sender = %key.sender, competition = %id, "Unknown competition");
                    let reason = format!("competition {id} not found");
                    ledger.mark_handled(&letter_id);
                    return Ok(refuse(notifier, &message, &key.sender, reason).await);
                }
                Err(PersistError::Database(err)) => return Err(WatcherError::Storage(err)),
            };

        ledger.mark_handled(&letter_id);
        match kind {
            LetterKind::New => ledger.record_new(key.clone()),
            LetterKind::Correction => {
                let remaining = ledger.record_correction(&key);
                debug!(sender = %key.sender, ?remaining, "Correction recorded");
            }
        }

        let report = Report::Uploaded {
            outcome: &outcome,
            rejected_rows: &sheet.row_errors,
        };
        reply(notifier, &message, &key.sender, report).await;

        Ok(LetterOutcome::Uploaded(outcome))
    }
}

async fn refuse(
    notifier: &dyn Notifier,
    message: &Message,
    sender: &str,
    reason: String,
) -> LetterOutcome {
    reply(notifier, message, sender, Report::Refused(&reason)).await;
    LetterOutcome::Refused(reason)
}

async fn reply(notifier: &dyn Notifier, message: &Message, sender: &str, report: Report<'_>) {
    let letter = compose_reply(sender, &message.subject(), message.message_id(), report);
    if let Err(err) = notifier.send(&letter).await {
        warn!(to = %sender, error = %err, "Reply not delivered");
    }
}
