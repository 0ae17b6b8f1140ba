//! Read-only lookup from participant attributes to category ids.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::model::{AGE_BINS, CategoryBin, Discipline, Sex};
use crate::registry::RegistryRepository;

/// One stored category definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    /// Category id.
    pub id: i64,
    /// Discipline of the category.
    pub discipline: Discipline,
    /// Sex, or [`Sex::Mixed`] for open categories.
    pub sex: Sex,
    /// Age bin; must be one of [`AGE_BINS`].
    pub age: CategoryBin,
    /// Kyu range, informational only.
    pub kyu: Option<CategoryBin>,
    /// Weight bin; required for kumite.
    pub weight: Option<CategoryBin>,
    /// Team kata category.
    pub group_kata: bool,
}

/// Errors building the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Category table could not be read.
    #[error("category source unreadable: {0}")]
    Unreadable(#[from] crate::Error),

    /// No usable category definitions.
    #[error("no categories defined")]
    Empty,
}

type Key = (CategoryBin, Sex);

/// Category ids keyed by discipline, age bin, sex and, for kumite, weight bin.
///
/// Built once and shared read-only between watchers.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    kata: HashMap<Key, i64>,
    group_kata: HashMap<CategoryBin, i64>,
    kumite: HashMap<Key, HashMap<CategoryBin, i64>>,
}

impl CategoryIndex {
    /// Builds the index from stored definitions.
    ///
    /// Rows with an age bin outside [`AGE_BINS`], kumite rows without a
    /// weight bin and kumite rows whose weight bin overlaps an earlier one of
    /// the same age and sex are skipped with a warning. When two rows share a
    /// key the first one wins.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Empty`] if no row could be indexed.
    pub fn build(rows: impl IntoIterator<Item = CategoryRow>) -> Result<Self, IndexError> {
        let mut index = Self::default();

        for row in rows {
            if !AGE_BINS.contains(&row.age) {
                warn!(id = row.id, age = %row.age, "Skipping category with unknown age bin");
                continue;
            }

            let inserted = match row.discipline {
                Discipline::Kata if row.group_kata => {
                    insert_once(&mut index.group_kata, row.age, row.id)
                }
                Discipline::Kata => insert_once(&mut index.kata, (row.age, row.sex), row.id),
                Discipline::Kumite => {
                    let Some(weight) = row.weight else {
                        warn!(id = row.id, "Skipping kumite category without weight bin");
                        continue;
                    };
                    let weights = index.kumite.entry((row.age, row.sex)).or_default();
                    if let Some((existing, id)) = weights
                        .iter()
                        .find(|(bin, _)| **bin != weight && bin.overlaps(&weight))
                    {
                        warn!(
                            id = row.id,
                            weight = %weight,
                            overlaps = %existing,
                            with = id,
                            "Skipping kumite category overlapping another weight bin"
                        );
                        continue;
                    }
                    insert_once(weights, weight, row.id)
                }
            };

            if !inserted {
                warn!(id = row.id, "Duplicate category key, keeping the first definition");
            }
        }

        if index.is_empty() {
            return Err(IndexError::Empty);
        }

        debug!(
            kata = index.kata.len(),
            group_kata = index.group_kata.len(),
            kumite = index.kumite.values().map(HashMap::len).sum::<usize>(),
            "Category index built"
        );
        Ok(index)
    }

    /// Reads the category table and builds the index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unreadable`] if the table cannot be read and
    /// [`IndexError::Empty`] if it holds no usable category.
    pub async fn load(repo: &RegistryRepository) -> Result<Self, IndexError> {
        let rows = repo.categories().await?;
        Self::build(rows)
    }

    /// Individual kata category for an age bin and sex.
    #[must_use]
    pub fn kata(&self, age: CategoryBin, sex: Sex) -> Option<i64> {
        self.kata.get(&(age, sex)).copied()
    }

    /// Team kata category for an age bin.
    #[must_use]
    pub fn group_kata(&self, age: CategoryBin) -> Option<i64> {
        self.group_kata.get(&age).copied()
    }

    /// Kumite category for an age bin, sex and exact weight bin.
    #[must_use]
    pub fn kumite(&self, age: CategoryBin, sex: Sex, weight: CategoryBin) -> Option<i64> {
        self.kumite.get(&(age, sex))?.get(&weight).copied()
    }

    /// Number of indexed categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kata.len()
            + self.group_kata.len()
            + self.kumite.values().map(HashMap::len).sum::<usize>()
    }

    /// Whether no category is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_once<K: std::hash::Hash + Eq>(map: &mut HashMap<K, i64>, key: K, id: i64) -> bool {
    if map.contains_key(&key) {
        return false;
    }
    map.insert(key, id);
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kata(id: i64, age: CategoryBin, sex: Sex) -> CategoryRow {
        CategoryRow {
            id,
            discipline: Discipline::Kata,
            sex,
            age,
            kyu: None,
            weight: None,
            group_kata: false,
        }
    }

    fn kumite(id: i64, age: CategoryBin, sex: Sex, weight: Option<CategoryBin>) -> CategoryRow {
        CategoryRow {
            id,
            discipline: Discipline::Kumite,
            sex,
            age,
            kyu: None,
            weight,
            group_kata: false,
        }
    }

    #[test]
    fn single_kata_entry() {
        let index = CategoryIndex::build([kata(7, CategoryBin::new(12, 14), Sex::Female)]).unwrap();
        assert_eq!(index.kata(CategoryBin::new(12, 14), Sex::Female), Some(7));
        assert_eq!(index.kata(CategoryBin::new(12, 14), Sex::Male), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn group_kata_is_separate_from_mixed_kata() {
        let mut group = kata(3, CategoryBin::new(12, 14), Sex::Mixed);
        group.group_kata = true;
        let index = CategoryIndex::build([
            kata(1, CategoryBin::new(12, 14), Sex::Mixed),
            group,
        ])
        .unwrap();

        assert_eq!(index.kata(CategoryBin::new(12, 14), Sex::Mixed), Some(1));
        assert_eq!(index.group_kata(CategoryBin::new(12, 14)), Some(3));
    }

    #[test]
    fn kumite_nested_by_weight() {
        let age = CategoryBin::from(18);
        let index = CategoryIndex::build([
            kumite(10, age, Sex::Male, Some(CategoryBin::new(50, 61))),
            kumite(11, age, Sex::Male, Some(CategoryBin::new(61, 71))),
            kumite(12, age, Sex::Male, Some(CategoryBin::from(84))),
        ])
        .unwrap();

        assert_eq!(index.kumite(age, Sex::Male, CategoryBin::new(61, 71)), Some(11));
        assert_eq!(index.kumite(age, Sex::Male, CategoryBin::from(84)), Some(12));
        assert_eq!(index.kumite(age, Sex::Male, CategoryBin::new(60, 71)), None);
        assert_eq!(index.kumite(age, Sex::Female, CategoryBin::new(61, 71)), None);
    }

    #[test]
    fn overlapping_weight_bins_keep_the_first() {
        let age = CategoryBin::new(16, 18);
        let index = CategoryIndex::build([
            kumite(20, age, Sex::Female, Some(CategoryBin::new(50, 61))),
            kumite(21, age, Sex::Female, Some(CategoryBin::new(60, 71))),
            kumite(22, age, Sex::Female, Some(CategoryBin::from(70))),
            kumite(23, age, Sex::Male, Some(CategoryBin::new(60, 71))),
        ])
        .unwrap();

        assert_eq!(index.kumite(age, Sex::Female, CategoryBin::new(50, 61)), Some(20));
        assert_eq!(index.kumite(age, Sex::Female, CategoryBin::new(60, 71)), None);
        assert_eq!(index.kumite(age, Sex::Female, CategoryBin::from(70)), Some(22));
        assert_eq!(index.kumite(age, Sex::Male, CategoryBin::new(60, 71)), Some(23));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn skips_bad_rows_and_keeps_first_duplicate() {
        let age = CategoryBin::new(14, 16);
        let index = CategoryIndex::build([
            kata(1, age, Sex::Male),
            kata(2, age, Sex::Male),
            kata(3, CategoryBin::new(13, 15), Sex::Male),
            kumite(4, age, Sex::Male, None),
        ])
        .unwrap();

        assert_eq!(index.kata(age, Sex::Male), Some(1));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_source_is_an_error() {
        assert!(matches!(
            CategoryIndex::build(Vec::new()),
            Err(IndexError::Empty)
        ));
    }
}
