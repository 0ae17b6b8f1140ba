//! Category Resolver.

use super::index::CategoryIndex;
use super::model::{CategoryBin, Sex};
use crate::sheet::ParticipantRecord;

/// Why a participant could not be placed in a category.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// Too young for any age bin.
    #[error("age {0} is below the youngest category")]
    AgeOutOfRange(u32),

    /// Actual weight outside the declared kumite category.
    #[error("weight {weight} kg does not fit declared category {declared}")]
    WeightOutOfCategory {
        /// Weight from the spreadsheet.
        weight: f64,
        /// Category the participant declared.
        declared: CategoryBin,
    },

    /// No category for this discipline, age and sex.
    #[error("no {discipline} category for age {age}, sex {sex}")]
    MissingCategory {
        /// `kata`, `group kata` or `kumite`.
        discipline: &'static str,
        /// Age bin looked up.
        age: CategoryBin,
        /// Sex looked up.
        sex: Sex,
    },

    /// The age/sex group has no kumite category with the declared bounds.
    #[error("no kumite weight category {weight} for age {age}, sex {sex}")]
    MissingWeight {
        /// Age bin looked up.
        age: CategoryBin,
        /// Sex looked up.
        sex: Sex,
        /// Declared weight bin.
        weight: CategoryBin,
    },
}

/// Resolves every category a participant competes in.
///
/// Ids are ordered kata, group kata, kumite. The kumite weight check runs
/// before any lookup. Individual kata falls back to the mixed category when
/// the age bin has no category for the participant's own sex.
///
/// # Errors
///
/// Returns the first [`ResolveError`] encountered.
pub fn resolve(
    participant: &ParticipantRecord,
    index: &CategoryIndex,
) -> Result<Vec<i64>, ResolveError> {
    if let Some(kumite) = &participant.kumite
        && !kumite.declared.contains(kumite.weight)
    {
        return Err(ResolveError::WeightOutOfCategory {
            weight: kumite.weight,
            declared: kumite.declared,
        });
    }

    let age = CategoryBin::for_age(participant.age)
        .ok_or(ResolveError::AgeOutOfRange(participant.age))?;
    let sex = participant.sex;
    let mut ids = Vec::with_capacity(3);

    if let Some(kata) = &participant.kata {
        let id = index
            .kata(age, sex)
            .or_else(|| index.kata(age, Sex::Mixed))
            .ok_or(ResolveError::MissingCategory {
                discipline: "kata",
                age,
                sex,
            })?;
        ids.push(id);

        if kata.group {
            let id = index.group_kata(age).ok_or(ResolveError::MissingCategory {
                discipline: "group kata",
                age,
                sex: Sex::Mixed,
            })?;
            ids.push(id);
        }
    }

    if let Some(kumite) = &participant.kumite {
        let id = index
            .kumite(age, sex, kumite.declared)
            .ok_or(ResolveError::MissingWeight {
                age,
                sex,
                weight: kumite.declared,
            })?;
        ids.push(id);
    }

    Ok(ids)
}
