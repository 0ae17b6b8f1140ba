//! Batch Persister.

use std::fmt;

use tracing::{debug, info, warn};

use super::repository::{NewParticipant, RegistryRepository};
use crate::category::{CategoryIndex, resolve};
use crate::sheet::ParticipantRecord;

/// Why an upload could not start.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The sheet names a competition that does not exist.
    #[error("competition {0} not found")]
    CompetitionNotFound(String),

    /// Competition lookup failed.
    #[error(transparent)]
    Database(#[from] crate::Error),
}

/// A participant that was not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    /// One-based spreadsheet row.
    pub row: usize,
    /// Participant name.
    pub full_name: String,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} ({}): {}", self.row, self.full_name, self.reason)
    }
}

/// Summary of one spreadsheet upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Participants not stored. Never below submitted minus added.
    pub failed_rows: usize,
    /// Per-row failures in row order.
    pub row_errors: Vec<RowFailure>,
    /// Names as returned by the database.
    pub added: Vec<String>,
    /// Number of stored participants.
    pub added_count: usize,
}

/// Corrects the failure count upward so failures and successes cover the batch.
#[must_use]
pub const fn reconcile_failures(submitted: usize, added: usize, failed: usize) -> usize {
    let missing = submitted.saturating_sub(added);
    if failed < missing { missing } else { failed }
}

/// Resolves and stores every participant of one sheet.
///
/// Each participant is inserted on its own; a resolution or insert failure is
/// recorded against that row and the batch continues.
///
/// # Errors
///
/// Returns [`PersistError::CompetitionNotFound`] if `submission_id` matches no
/// competition, or [`PersistError::Database`] if the lookup itself fails.
pub async fn persist(
    repo: &RegistryRepository,
    index: &CategoryIndex,
    participants: &[ParticipantRecord],
    submission_id: &str,
) -> Result<UploadOutcome, PersistError> {
    let competition_id = repo
        .competition_id(submission_id)
        .await?
        .ok_or_else(|| PersistError::CompetitionNotFound(submission_id.to_string()))?;

    let mut outcome = UploadOutcome::default();

    for participant in participants {
        let failure = |reason: String| RowFailure {
            row: participant.row,
            full_name: participant.full_name.clone(),
            reason,
        };

        let ids = match resolve(participant, index) {
            Ok(ids) => ids,
            Err(err) => {
                debug!(row = participant.row, error = %err, "Category not resolved");
                outcome.row_errors.push(failure(err.to_string()));
                continue;
            }
        };

        let record = NewParticipant::from_record(participant, competition_id, ids);
        match repo.insert_participant(&record).await {
            Ok(name) => outcome.added.push(name),
            Err(err) => {
                warn!(row = participant.row, error = %err, "Participant insert failed");
                outcome.row_errors.push(failure(err.to_string()));
            }
        }
    }

    outcome.added_count = outcome.added.len();
    outcome.failed_rows = reconcile_failures(
        participants.len(),
        outcome.added_count,
        outcome.row_errors.len(),
    );

    info!(
        competition = competition_id,
        added = outcome.added_count,
        failed = outcome.failed_rows,
        "Upload finished"
    );
    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;
    use crate::category::{CategoryBin, CategoryRow, Discipline, Sex};
    use crate::sheet::{KataEntry, KumiteEntry};

    const UUID: &str = "5f1c2a4e-0000-4000-8000-000000000001";

    async fn setup() -> (RegistryRepository, CategoryIndex) {
        let repo = RegistryRepository::in_memory().await.unwrap();
        repo.add_competition(UUID, "City Cup", NaiveDate::from_ymd_opt(2099, 12, 31).unwrap())
            .await
            .unwrap();

        let categories = [
            CategoryRow {
                id: 7,
                discipline: Discipline::Kata,
                sex: Sex::Female,
                age: CategoryBin::new(12, 14),
                kyu: None,
                weight: None,
                group_kata: false,
            },
            CategoryRow {
                id: 30,
                discipline: Discipline::Kumite,
                sex: Sex::Female,
                age: CategoryBin::new(12, 14),
                kyu: None,
                weight: Some(CategoryBin::new(35, 41)),
                group_kata: false,
            },
        ];
        for category in &categories {
            repo.add_category(category).await.unwrap();
        }
        let index = CategoryIndex::build(repo.categories().await.unwrap()).unwrap();
        (repo, index)
    }

    fn participant(row: usize, name: &str, weight: Option<f64>) -> ParticipantRecord {
        ParticipantRecord {
            row,
            full_name: name.into(),
            sex: Sex::Female,
            age: 13,
            kyu: 8,
            dan: 0,
            city: "Kazan".into(),
            coach: "Ivanov".into(),
            kata: Some(KataEntry { group: false }),
            kumite: weight.map(|weight| KumiteEntry {
                weight,
                declared: CategoryBin::new(35, 41),
            }),
        }
    }

    #[tokio::test]
    async fn test_overweight_participant_fails_alone() {
        let (repo, index) = setup().await;
        let participants = [
            participant(7, "Anna", Some(38.0)),
            participant(8, "Maria", Some(44.0)),
            participant(9, "Olga", None),
        ];

        let outcome = persist(&repo, &index, &participants, UUID).await.unwrap();

        assert_eq!(outcome.added, vec!["Anna", "Olga"]);
        assert_eq!(outcome.added_count, 2);
        assert_eq!(outcome.failed_rows, 1);
        assert_eq!(outcome.row_errors[0].row, 8);
        assert!(outcome.row_errors[0].to_string().starts_with("row 8 (Maria): weight 44"));

        let competition = repo.competition_id(UUID).await.unwrap().unwrap();
        let stored = repo.participants(competition).await.unwrap();
        assert_eq!(stored[0].category_ids, vec![7, 30]);
        assert_eq!(stored[1].category_ids, vec![7]);
    }

    #[tokio::test]
    async fn test_unknown_competition() {
        let (repo, index) = setup().await;
        let err = persist(&repo, &index, &[participant(7, "Anna", None)], "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::CompetitionNotFound(id) if id == "missing"));
    }

    #[test]
    fn reconcile_corrects_upward() {
        assert_eq!(reconcile_failures(5, 2, 1), 3);
        assert_eq!(reconcile_failures(5, 2, 3), 3);
        assert_eq!(reconcile_failures(0, 0, 0), 0);
    }

    proptest! {
        #[test]
        fn reconciled_failures_cover_the_batch(
            submitted in 0usize..2000,
            added_share in 0usize..=100,
            failed in 0usize..2000,
        ) {
            let added = submitted * added_share / 100;
            let reconciled = reconcile_failures(submitted, added, failed);
            prop_assert!(reconciled >= submitted - added);
            prop_assert!(reconciled >= failed);
        }
    }
}
