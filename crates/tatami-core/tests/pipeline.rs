//! Whole letters through filter, classifier, resolver, persister and reply.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tatami_core::{
    CategoryBin, CategoryIndex, CategoryRow, ClassifyError, DedupKey, DedupLedger, Discipline,
    LetterOutcome, MockClock, Notifier, NotifyError, Pipeline, RawLetter, RegistryRepository,
    RejectReason, ReplyLetter, Sex, SheetReader,
};
use tatami_mime::encoding::encode_base64;

const UUID: &str = "5f1c2a4e-0000-4000-8000-000000000001";
const COACH: &str = "coach@example.com";

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<ReplyLetter>>,
}

impl Outbox {
    fn take(&self) -> Vec<ReplyLetter> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, letter: &ReplyLetter) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(letter.clone());
        Ok(())
    }
}

/// Spreadsheets as text: one row per line, cells separated by `;`.
struct TextSheets;

impl SheetReader for TextSheets {
    fn read_rows(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, ClassifyError> {
        let text =
            std::str::from_utf8(bytes).map_err(|e| ClassifyError::Workbook(e.to_string()))?;
        Ok(text
            .lines()
            .map(|line| line.split(';').map(|cell| cell.trim().to_string()).collect())
            .collect())
    }
}

fn sheet(competition: &str, rows: &[&str]) -> String {
    let mut lines = vec!["City Cup registration".to_string(), competition.to_string()];
    lines.extend(["", "", "", ""].map(String::from));
    lines.extend(rows.iter().map(|row| (*row).to_string()));
    lines.join("\r\n")
}

fn letter(seq: u32, subject: &str, sheet: &str) -> RawLetter {
    let raw = format!(
        "From: Coach <{COACH}>\r\n\
         To: registrar@example.com\r\n\
         Date: Wed, 01 Apr 2099 09:00:00 +0000\r\n\
         Subject: {subject}\r\n\
         Message-ID: <{seq}@example.com>\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"frontier\"\r\n\
         \r\n\
         --frontier\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Our team.\r\n\
         --frontier\r\n\
         Content-Type: application/octet-stream; name=\"Team.XLSX\"\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         {}\r\n\
         --frontier--\r\n",
        encode_base64(sheet.as_bytes())
    );
    RawLetter {
        seq,
        raw: raw.into_bytes(),
    }
}

fn category(id: i64, discipline: Discipline, sex: Sex) -> CategoryRow {
    CategoryRow {
        id,
        discipline,
        sex,
        age: CategoryBin::new(12, 14),
        kyu: None,
        weight: None,
        group_kata: false,
    }
}

async fn setup() -> (RegistryRepository, Pipeline) {
    let repo = RegistryRepository::in_memory().await.unwrap();
    repo.add_competition(UUID, "City Cup", NaiveDate::from_ymd_opt(2099, 5, 1).unwrap())
        .await
        .unwrap();

    let mut group = category(20, Discipline::Kata, Sex::Mixed);
    group.group_kata = true;
    let mut kumite = category(30, Discipline::Kumite, Sex::Female);
    kumite.weight = Some(CategoryBin::new(35, 41));
    for row in [category(7, Discipline::Kata, Sex::Female), group, kumite] {
        repo.add_category(&row).await.unwrap();
    }

    let index = CategoryIndex::build(repo.categories().await.unwrap()).unwrap();
    let pipeline = Pipeline::new(repo.clone(), Arc::new(index))
        .with_reader(Arc::new(TextSheets))
        .with_clock(Arc::new(MockClock::new(
            NaiveDate::from_ymd_opt(2099, 4, 1).unwrap(),
        )));
    (repo, pipeline)
}

fn key() -> DedupKey {
    DedupKey::new(NaiveDate::from_ymd_opt(2099, 5, 1).unwrap(), COACH)
}

const TEAM: [&str; 4] = [
    "Anna Petrova;f;13;8;Kazan;kata/kumite;no;38;40;Ivanov;",
    "Olga Sokolova;f;12;9;Kazan;kata;yes;;;Ivanov;",
    ";;;;;;;;;;",
    "Ivan Orlov;m;13;8;Kazan;kata;;;;Ivanov;",
];

#[tokio::test]
async fn uploads_registration_and_answers_sender() {
    let (repo, pipeline) = setup().await;
    let outbox = Outbox::default();
    let mut ledger = DedupLedger::new(2);

    let outcome = pipeline
        .process(
            &letter(1, "Competition 01.05.2099 City Cup", &sheet(UUID, &TEAM)),
            &mut ledger,
            &outbox,
        )
        .await
        .unwrap();

    let LetterOutcome::Uploaded(outcome) = outcome else {
        panic!("letter was not uploaded");
    };
    assert_eq!(outcome.added, vec!["Anna Petrova", "Olga Sokolova"]);
    assert_eq!(outcome.failed_rows, 1);
    assert_eq!(outcome.row_errors[0].row, 10);
    assert_eq!(ledger.remaining(&key()), Some(2));

    let competition = repo.competition_id(UUID).await.unwrap().unwrap();
    let stored = repo.participants(competition).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].category_ids, vec![7, 30]);
    assert_eq!(stored[1].category_ids, vec![7, 20]);

    let replies = outbox.take();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].to, COACH);
    assert_eq!(replies[0].subject, "Re: Competition 01.05.2099 City Cup");
    assert_eq!(replies[0].in_reply_to.as_deref(), Some("<1@example.com>"));
    assert!(replies[0].html.contains("2 participant(s) added, 1 not added"));
    assert!(replies[0].html.contains("Ivan Orlov"));
}

#[tokio::test]
async fn corrections_spend_edits() {
    let (_repo, pipeline) = setup().await;
    let outbox = Outbox::default();
    let mut ledger = DedupLedger::new(2);
    let team = sheet(UUID, &TEAM[..1]);

    let first = pipeline
        .process(&letter(1, "Competition 01.05.2099", &team), &mut ledger, &outbox)
        .await
        .unwrap();
    assert!(matches!(first, LetterOutcome::Uploaded(_)));

    let plain = pipeline
        .process(&letter(2, "Competition 01.05.2099", &team), &mut ledger, &outbox)
        .await
        .unwrap();
    assert_eq!(plain, LetterOutcome::Skipped(RejectReason::NotACorrection));

    let subject = "Competition 01.05.2099 Correction";
    for seq in 3..=4 {
        let corrected = pipeline
            .process(&letter(seq, subject, &team), &mut ledger, &outbox)
            .await
            .unwrap();
        assert!(matches!(corrected, LetterOutcome::Uploaded(_)));
    }
    assert_eq!(ledger.remaining(&key()), Some(0));

    let exhausted = pipeline
        .process(&letter(5, subject, &team), &mut ledger, &outbox)
        .await
        .unwrap();
    assert_eq!(exhausted, LetterOutcome::Skipped(RejectReason::QuotaExhausted));

    // Skipped letters are never answered.
    assert_eq!(outbox.take().len(), 3);
}

#[tokio::test]
async fn unknown_competition_is_refused_with_reply() {
    let (_repo, pipeline) = setup().await;
    let outbox = Outbox::default();
    let mut ledger = DedupLedger::new(2);

    let outcome = pipeline
        .process(
            &letter(1, "Competition 01.05.2099", &sheet("no-such-competition", &TEAM)),
            &mut ledger,
            &outbox,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, LetterOutcome::Refused(ref reason) if reason.contains("not found")));
    assert!(ledger.is_empty());
    let replies = outbox.take();
    assert!(replies[0].html.contains("competition no-such-competition not found"));
}

#[tokio::test]
async fn refetched_letter_is_not_answered_again() {
    let (_repo, pipeline) = setup().await;
    let outbox = Outbox::default();
    let mut ledger = DedupLedger::new(2);
    let unknown = letter(1, "Competition 01.05.2099", &sheet("no-such-competition", &TEAM));

    let first = pipeline.process(&unknown, &mut ledger, &outbox).await.unwrap();
    assert!(matches!(first, LetterOutcome::Refused(_)));

    let again = pipeline.process(&unknown, &mut ledger, &outbox).await.unwrap();
    assert_eq!(again, LetterOutcome::Skipped(RejectReason::AlreadyHandled));
    assert_eq!(outbox.take().len(), 1);
}

#[tokio::test]
async fn error_heavy_sheet_is_refused() {
    let (repo, pipeline) = setup().await;
    let outbox = Outbox::default();
    let mut ledger = DedupLedger::new(2);
    let rows = [
        "Anna Petrova;f;13;8;Kazan;judo;;;;Ivanov;",
        "Olga Sokolova;x;12;9;Kazan;kata;;;;Ivanov;",
    ];

    let outcome = pipeline
        .process(&letter(1, "Competition 01.05.2099", &sheet(UUID, &rows)), &mut ledger, &outbox)
        .await
        .unwrap();

    assert!(matches!(outcome, LetterOutcome::Refused(_)));
    assert!(ledger.is_empty());
    let competition = repo.competition_id(UUID).await.unwrap().unwrap();
    assert!(repo.participants(competition).await.unwrap().is_empty());
    assert_eq!(outbox.take().len(), 1);
}

#[tokio::test]
async fn past_competition_is_skipped_silently() {
    let (_repo, pipeline) = setup().await;
    let outbox = Outbox::default();
    let mut ledger = DedupLedger::new(2);

    let outcome = pipeline
        .process(&letter(1, "Competition 01.03.2099", &sheet(UUID, &TEAM)), &mut ledger, &outbox)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LetterOutcome::Skipped(RejectReason::PastDate(
            NaiveDate::from_ymd_opt(2099, 3, 1).unwrap()
        ))
    );
    assert!(outbox.take().is_empty());
}
