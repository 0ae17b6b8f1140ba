//! Letter Filter: decides whether a fetched letter carries a registration.
//!
//! Checks run in order and stop at the first failure:
//!
//! 1. sender and date headers are present
//! 2. the letter was not answered on an earlier poll
//! 3. the subject is `<keyword> DD.MM.YYYY ...`
//! 4. the date is a real calendar date, today or later
//! 5. the sender still has quota for that date in the [`DedupLedger`]
//! 6. an `.xlsx` attachment is present and decodes
//!
//! The filter never touches the ledger; the caller records the submission
//! once the spreadsheet has been persisted.

use chrono::NaiveDate;
use serde::Deserialize;
use tatami_mime::Message;

use crate::ledger::{DedupKey, DedupLedger};

/// File extension of registration spreadsheets.
pub const SPREADSHEET_EXTENSION: &str = ".xlsx";

/// Subject keywords recognized by the filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// First word of every registration subject.
    pub subject_keyword: String,
    /// Word marking a resubmission as a correction.
    pub correction_keyword: String,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            subject_keyword: "Competition".into(),
            correction_keyword: "correction".into(),
        }
    }
}

/// Whether an accepted letter is a first submission or a correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterKind {
    /// No earlier submission for this key.
    New,
    /// Resubmission spending one edit.
    Correction,
}

/// Why a letter was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// No usable `From` address.
    #[error("letter has no sender address")]
    MissingSender,

    /// `Date` header missing or not an RFC 2822 timestamp.
    #[error("letter has no valid Date header")]
    MissingDate,

    /// The letter was already answered on an earlier poll.
    #[error("letter already handled")]
    AlreadyHandled,

    /// Subject does not start with the keyword and a date.
    #[error("subject does not match: {0:?}")]
    SubjectMismatch(String),

    /// The date token is not a calendar date.
    #[error("invalid competition date: {0}")]
    InvalidDate(String),

    /// The competition has already taken place.
    #[error("competition date {0} is in the past")]
    PastDate(NaiveDate),

    /// All corrections for this submission are used up.
    #[error("no corrections left")]
    QuotaExhausted,

    /// Resubmission without the correction keyword.
    #[error("already submitted and subject is not marked as a correction")]
    NotACorrection,

    /// No `.xlsx` attachment.
    #[error("no spreadsheet attached")]
    NoSpreadsheet,

    /// The attachment body could not be decoded.
    #[error("attachment could not be decoded: {0}")]
    UnreadableAttachment(String),
}

/// Outcome of filtering one letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The letter should be classified.
    Accept {
        /// Identity of the letter, marked handled once it is answered.
        letter_id: String,
        /// Ledger key to update after a successful upload.
        key: DedupKey,
        /// New submission or correction.
        kind: LetterKind,
        /// Decoded spreadsheet bytes.
        spreadsheet: Vec<u8>,
    },
    /// The letter is skipped.
    Reject(RejectReason),
}

/// Applies every check to `message`.
///
/// `today` is the processing date; a competition held today is still accepted.
#[must_use]
pub fn filter(
    message: &Message,
    ledger: &DedupLedger,
    rules: &FilterRules,
    today: NaiveDate,
) -> Verdict {
    match check(message, ledger, rules, today) {
        Ok(verdict) => verdict,
        Err(reason) => Verdict::Reject(reason),
    }
}

fn check(
    message: &Message,
    ledger: &DedupLedger,
    rules: &FilterRules,
    today: NaiveDate,
) -> Result<Verdict, RejectReason> {
    let sender = message.sender().ok_or(RejectReason::MissingSender)?;
    let sent = message.date().ok_or(RejectReason::MissingDate)?;
    let subject = message.subject();

    let letter_id = message.message_id().map_or_else(
        || format!("{sender} {} {subject}", sent.to_rfc3339()),
        str::to_string,
    );
    if ledger.is_handled(&letter_id) {
        return Err(RejectReason::AlreadyHandled);
    }

    let date = competition_date(&subject, &rules.subject_keyword)?;
    if date < today {
        return Err(RejectReason::PastDate(date));
    }

    let key = DedupKey::new(date, &sender);
    let kind = match ledger.remaining(&key) {
        None => LetterKind::New,
        Some(0) => return Err(RejectReason::QuotaExhausted),
        Some(_) if contains_keyword(&subject, &rules.correction_keyword) => LetterKind::Correction,
        Some(_) => return Err(RejectReason::NotACorrection),
    };

    let attachment = message
        .attachment_with_extension(SPREADSHEET_EXTENSION)
        .ok_or(RejectReason::NoSpreadsheet)?;
    let spreadsheet = attachment
        .decode_body()
        .map_err(|e| RejectReason::UnreadableAttachment(e.to_string()))?;

    Ok(Verdict::Accept {
        letter_id,
        key,
        kind,
        spreadsheet,
    })
}

/// Extracts the date from `<keyword> DD.MM.YYYY ...`.
///
/// # Errors
///
/// Returns [`RejectReason::SubjectMismatch`] when the first word is not the
/// keyword or the second word is not shaped like a date, and
/// [`RejectReason::InvalidDate`] when it is shaped like one but does not exist.
pub fn competition_date(subject: &str, keyword: &str) -> Result<NaiveDate, RejectReason> {
    let mut words = subject.split_whitespace();
    let mismatch = || RejectReason::SubjectMismatch(subject.to_string());

    let first = words.next().ok_or_else(mismatch)?;
    if first.to_lowercase() != keyword.to_lowercase() {
        return Err(mismatch());
    }

    let token = words.next().ok_or_else(mismatch)?;
    if !is_date_shaped(token) {
        return Err(mismatch());
    }

    NaiveDate::parse_from_str(token, "%d.%m.%Y")
        .map_err(|_| RejectReason::InvalidDate(token.to_string()))
}

fn is_date_shaped(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b'.',
            _ => b.is_ascii_digit(),
        })
}

fn contains_keyword(subject: &str, keyword: &str) -> bool {
    !keyword.is_empty() && subject.to_lowercase().contains(&keyword.to_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    fn letter(subject: &str) -> Message {
        let raw = format!(
            "From: Coach <Coach@Example.com>\r\n\
             Date: Sat, 01 Jun 2030 10:00:00 +0000\r\n\
             Subject: {subject}\r\n\
             Content-Type: multipart/mixed; boundary=\"b\"\r\n\
             \r\n\
             --b\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             see attached\r\n\
             --b\r\n\
             Content-Type: application/octet-stream; name=\"team.xlsx\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             UEsDBA==\r\n\
             --b--\r\n"
        );
        Message::parse(raw.as_bytes()).unwrap()
    }

    fn run(subject: &str, ledger: &DedupLedger) -> Verdict {
        filter(&letter(subject), ledger, &FilterRules::default(), today())
    }

    #[test]
    fn accepts_future_competition() {
        let verdict = run("Competition 31.12.2099", &DedupLedger::new(2));
        let Verdict::Accept {
            letter_id,
            key,
            kind,
            spreadsheet,
        } = verdict
        else {
            panic!("expected the letter to be accepted");
        };
        assert_eq!(kind, LetterKind::New);
        assert_eq!(key.sender, "coach@example.com");
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2099, 12, 31).unwrap());
        assert_eq!(spreadsheet, b"PK\x03\x04");
        assert_eq!(
            letter_id,
            "coach@example.com 2030-06-01T10:00:00+00:00 Competition 31.12.2099"
        );
    }

    #[test]
    fn accepts_competition_held_today() {
        let verdict = run("Competition 01.06.2030", &DedupLedger::new(2));
        assert!(matches!(verdict, Verdict::Accept { .. }));
    }

    #[test]
    fn rejects_missing_date() {
        assert!(matches!(
            run("Competition", &DedupLedger::new(2)),
            Verdict::Reject(RejectReason::SubjectMismatch(_))
        ));
    }

    #[test]
    fn rejects_impossible_date() {
        assert_eq!(
            run("Competition 99.99.9999", &DedupLedger::new(2)),
            Verdict::Reject(RejectReason::InvalidDate("99.99.9999".into()))
        );
    }

    #[test]
    fn rejects_past_date() {
        assert!(matches!(
            run("Competition 31.05.2030", &DedupLedger::new(2)),
            Verdict::Reject(RejectReason::PastDate(_))
        ));
    }

    #[test]
    fn rejects_other_keyword() {
        assert!(matches!(
            run("Invoice 31.12.2099", &DedupLedger::new(2)),
            Verdict::Reject(RejectReason::SubjectMismatch(_))
        ));
    }

    #[test]
    fn keyword_is_case_insensitive() {
        assert!(matches!(
            run("COMPETITION 31.12.2099", &DedupLedger::new(2)),
            Verdict::Accept { .. }
        ));
    }

    #[test]
    fn resubmission_needs_correction_keyword() {
        let mut ledger = DedupLedger::new(2);
        ledger.record_new(DedupKey::new(
            NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            "coach@example.com",
        ));

        assert_eq!(
            run("Competition 31.12.2099", &ledger),
            Verdict::Reject(RejectReason::NotACorrection)
        );

        let verdict = run("Competition 31.12.2099 Correction", &ledger);
        assert!(matches!(
            verdict,
            Verdict::Accept {
                kind: LetterKind::Correction,
                ..
            }
        ));
    }

    #[test]
    fn exhausted_quota_drops_letter() {
        let key = DedupKey::new(
            NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            "coach@example.com",
        );
        let mut ledger = DedupLedger::new(2);
        ledger.record_new(key.clone());
        ledger.record_correction(&key);
        ledger.record_correction(&key);

        assert_eq!(
            run("Competition 31.12.2099 correction", &ledger),
            Verdict::Reject(RejectReason::QuotaExhausted)
        );
    }

    #[test]
    fn letter_without_spreadsheet_is_rejected() {
        let raw = b"From: coach@example.com\r\nDate: Sat, 01 Jun 2030 10:00:00 +0000\r\n\
                    Subject: Competition 31.12.2099\r\n\r\nhello\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(
            filter(
                &message,
                &DedupLedger::new(2),
                &FilterRules::default(),
                today()
            ),
            Verdict::Reject(RejectReason::NoSpreadsheet)
        );
    }

    #[test]
    fn letter_without_sender_is_rejected() {
        let raw = b"Subject: Competition 31.12.2099\r\n\r\nhello\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(
            filter(
                &message,
                &DedupLedger::new(2),
                &FilterRules::default(),
                today()
            ),
            Verdict::Reject(RejectReason::MissingSender)
        );
    }

    #[test]
    fn letter_without_date_is_rejected() {
        let raw = b"From: coach@example.com\r\nSubject: Competition 31.12.2099\r\n\r\nhello\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(
            filter(
                &message,
                &DedupLedger::new(2),
                &FilterRules::default(),
                today()
            ),
            Verdict::Reject(RejectReason::MissingDate)
        );
    }

    #[test]
    fn letter_with_garbled_date_is_rejected() {
        let raw = b"From: coach@example.com\r\nDate: last friday\r\n\
                    Subject: Competition 31.12.2099\r\n\r\nhello\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(
            filter(
                &message,
                &DedupLedger::new(2),
                &FilterRules::default(),
                today()
            ),
            Verdict::Reject(RejectReason::MissingDate)
        );
    }

    #[test]
    fn handled_letter_is_skipped() {
        let mut ledger = DedupLedger::new(2);
        let Verdict::Accept { letter_id, .. } = run("Competition 31.12.2099 correction", &ledger)
        else {
            panic!("expected the letter to be accepted");
        };

        ledger.mark_handled(&letter_id);
        assert_eq!(
            run("Competition 31.12.2099 correction", &ledger),
            Verdict::Reject(RejectReason::AlreadyHandled)
        );
    }

    #[test]
    fn date_shape_check() {
        assert!(is_date_shaped("01.02.2030"));
        assert!(!is_date_shaped("1.02.2030"));
        assert!(!is_date_shaped("01-02-2030"));
    }
}
