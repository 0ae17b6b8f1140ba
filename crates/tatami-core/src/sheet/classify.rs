//! Spreadsheet Classifier: rows to participant records.
//!
//! Layout of a registration sheet:
//!
//! - rows `0..6` are metadata; cell `(1, 0)` holds the competition UUID
//! - every later row is one participant, columns fixed by [`Column`]
//!
//! A row lists its disciplines as `kata`, `kumite` or `kata/kumite`
//! (Cyrillic `кат`, `кум` accepted). Each discipline reads its own columns.

use std::collections::HashSet;
use std::fmt;

use crate::category::{ADULT_AGE, CategoryBin, Sex};

/// Rows before the first participant.
pub const METADATA_ROWS: usize = 6;

/// Largest sheet accepted, metadata included.
pub const MAX_ROWS: usize = 1500;

/// A row with more filled cells than this is considered long.
pub const LONG_ROW_CELLS: usize = 15;

/// More long rows than this and the sheet is treated as spam.
pub const SPAM_LONG_ROWS: usize = 10;

/// A sheet whose error rate exceeds this percentage is rejected whole.
pub const MAX_ERROR_PERCENT: f64 = 50.0;

/// A data row. Cells are trimmed strings; missing cells read as empty.
pub type Row = Vec<String>;

/// Fixed columns of a participant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Full name.
    Name,
    /// Sex.
    Sex,
    /// Age in whole years.
    Age,
    /// Kyu grade.
    Kyu,
    /// Home city.
    City,
    /// Discipline token.
    Discipline,
    /// Team kata flag.
    GroupFlag,
    /// Weight in kg.
    Weight,
    /// Declared kumite weight category.
    DeclaredBound,
    /// Coach name.
    Coach,
    /// Dan grade.
    Dan,
}

impl Column {
    const REQUIRED: [Self; 5] = [Self::Name, Self::Sex, Self::Age, Self::Discipline, Self::City];

    /// Zero-based cell position.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Name => 0,
            Self::Sex => 1,
            Self::Age => 2,
            Self::Kyu => 3,
            Self::City => 4,
            Self::Discipline => 5,
            Self::GroupFlag => 6,
            Self::Weight => 7,
            Self::DeclaredBound => 8,
            Self::Coach => 9,
            Self::Dan => 10,
        }
    }

    const fn title(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Sex => "sex",
            Self::Age => "age",
            Self::Kyu => "kyu",
            Self::City => "city",
            Self::Discipline => "discipline",
            Self::GroupFlag => "group kata",
            Self::Weight => "weight",
            Self::DeclaredBound => "weight category",
            Self::Coach => "coach",
            Self::Dan => "dan",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Kata participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KataEntry {
    /// Also performs team kata.
    pub group: bool,
}

/// Kumite participation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KumiteEntry {
    /// Actual weight in kg.
    pub weight: f64,
    /// Weight category the participant declared.
    pub declared: CategoryBin,
}

/// One participant row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    /// One-based spreadsheet row.
    pub row: usize,
    /// Full name; unique within a sheet.
    pub full_name: String,
    /// Participant sex.
    pub sex: Sex,
    /// Age in years.
    pub age: u32,
    /// Kyu grade, 0 when empty.
    pub kyu: u32,
    /// Dan grade, 0 when empty.
    pub dan: u32,
    /// Home city.
    pub city: String,
    /// Coach name, may be empty.
    pub coach: String,
    /// Present when the row enters kata.
    pub kata: Option<KataEntry>,
    /// Present when the row enters kumite.
    pub kumite: Option<KumiteEntry>,
}

/// A problem with a single row. The rest of the sheet is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// A required cell is empty.
    #[error("row {row}: {column} is empty")]
    MissingCell {
        /// One-based row.
        row: usize,
        /// The empty column.
        column: Column,
    },

    /// Discipline token is not kata, kumite or both.
    #[error("row {row}: unknown discipline {token:?}")]
    UnknownDiscipline {
        /// One-based row.
        row: usize,
        /// Cell content.
        token: String,
    },

    /// A numeric cell does not hold a usable number.
    #[error("row {row}: {column} {value:?} is not a valid number")]
    InvalidNumber {
        /// One-based row.
        row: usize,
        /// Offending column.
        column: Column,
        /// Cell content.
        value: String,
    },

    /// Sex cell is not male or female.
    #[error("row {row}: unknown sex {value:?}")]
    InvalidSex {
        /// One-based row.
        row: usize,
        /// Cell content.
        value: String,
    },

    /// Team kata flag is not yes or no.
    #[error("row {row}: group kata flag {value:?} is not yes/no")]
    InvalidFlag {
        /// One-based row.
        row: usize,
        /// Cell content.
        value: String,
    },

    /// The same full name appears on an earlier row.
    #[error("row {row}: {name} is already listed")]
    DuplicateName {
        /// One-based row.
        row: usize,
        /// Repeated name.
        name: String,
    },
}

impl RowError {
    /// One-based row the error refers to.
    #[must_use]
    pub const fn row(&self) -> usize {
        match self {
            Self::MissingCell { row, .. }
            | Self::UnknownDiscipline { row, .. }
            | Self::InvalidNumber { row, .. }
            | Self::InvalidSex { row, .. }
            | Self::InvalidFlag { row, .. }
            | Self::DuplicateName { row, .. } => *row,
        }
    }
}

/// Reasons a whole sheet is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    /// Sheet is larger than [`MAX_ROWS`].
    #[error("sheet has {rows} rows, the limit is {limit}")]
    TooManyRows {
        /// Rows in the sheet.
        rows: usize,
        /// Row limit.
        limit: usize,
    },

    /// Too many suspiciously wide rows.
    #[error("sheet looks like spam: {long_rows} rows are suspiciously wide")]
    SpamSuspected {
        /// Rows wider than [`LONG_ROW_CELLS`].
        long_rows: usize,
    },

    /// No competition UUID in the metadata block.
    #[error("competition identifier missing from the sheet header")]
    MissingSubmissionId,

    /// The workbook could not be opened or has no sheet.
    #[error("workbook unreadable: {0}")]
    Workbook(String),
}

/// Result of classifying one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSheet {
    /// Competition UUID from the metadata block.
    pub submission_id: String,
    /// Rows that converted cleanly.
    pub participants: Vec<ParticipantRecord>,
    /// Every row problem, in row order.
    pub row_errors: Vec<RowError>,
    /// Percentage of failed rows among rows with all required cells.
    pub error_percent: f64,
}

impl ClassifiedSheet {
    /// Whether the error rate allows the sheet to be uploaded.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.error_percent <= MAX_ERROR_PERCENT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entries {
    Kata,
    Kumite,
    Both,
}

impl Entries {
    fn parse(token: &str) -> Option<Self> {
        use crate::category::Discipline;

        let mut parts = token.split('/').map(Discipline::parse);
        let first = parts.next()??;
        let second = parts.next().map_or(Some(None), |d| d.map(Some))?;
        if parts.next().is_some() {
            return None;
        }

        match (first, second) {
            (Discipline::Kata, None) => Some(Self::Kata),
            (Discipline::Kumite, None) => Some(Self::Kumite),
            (Discipline::Kata, Some(Discipline::Kumite))
            | (Discipline::Kumite, Some(Discipline::Kata)) => Some(Self::Both),
            _ => None,
        }
    }

    const fn kata(self) -> bool {
        matches!(self, Self::Kata | Self::Both)
    }

    const fn kumite(self) -> bool {
        matches!(self, Self::Kumite | Self::Both)
    }
}

/// Turns sheet rows into participant records.
///
/// # Errors
///
/// Returns a [`ClassifyError`] when the whole sheet must be refused. Row
/// problems are collected in [`ClassifiedSheet::row_errors`] instead.
pub fn classify(rows: &[Row]) -> Result<ClassifiedSheet, ClassifyError> {
    if rows.len() > MAX_ROWS {
        return Err(ClassifyError::TooManyRows {
            rows: rows.len(),
            limit: MAX_ROWS,
        });
    }

    let long_rows = rows
        .iter()
        .skip(METADATA_ROWS)
        .filter(|row| width(row) > LONG_ROW_CELLS)
        .count();
    if long_rows > SPAM_LONG_ROWS {
        return Err(ClassifyError::SpamSuspected { long_rows });
    }

    let submission_id = rows
        .get(1)
        .map(|row| cell(row, 0))
        .filter(|id| !id.is_empty())
        .ok_or(ClassifyError::MissingSubmissionId)?
        .to_string();

    let mut participants = Vec::new();
    let mut row_errors = Vec::new();
    let mut names = HashSet::new();
    let mut checked = 0u32;
    let mut failed = 0u32;

    for (index, row) in rows.iter().enumerate().skip(METADATA_ROWS) {
        if width(row) == 0 {
            continue;
        }
        let number = index + 1;

        if let Some(column) = Column::REQUIRED
            .into_iter()
            .find(|c| cell(row, c.index()).is_empty())
        {
            row_errors.push(RowError::MissingCell {
                row: number,
                column,
            });
            continue;
        }

        checked += 1;
        match read_participant(row, number) {
            Ok(record) if !names.insert(record.full_name.clone()) => {
                failed += 1;
                row_errors.push(RowError::DuplicateName {
                    row: number,
                    name: record.full_name,
                });
            }
            Ok(record) => participants.push(record),
            Err(err) => {
                failed += 1;
                row_errors.push(err);
            }
        }
    }

    let error_percent = if checked == 0 {
        0.0
    } else {
        f64::from(failed) / f64::from(checked) * 100.0
    };

    Ok(ClassifiedSheet {
        submission_id,
        participants,
        row_errors,
        error_percent,
    })
}

fn read_participant(row: &[String], number: usize) -> Result<ParticipantRecord, RowError> {
    let token = cell(row, Column::Discipline.index());
    let entries = Entries::parse(token).ok_or_else(|| RowError::UnknownDiscipline {
        row: number,
        token: token.to_string(),
    })?;

    let sex_cell = cell(row, Column::Sex.index());
    let sex = Sex::parse(sex_cell)
        .filter(|sex| *sex != Sex::Mixed)
        .ok_or_else(|| RowError::InvalidSex {
            row: number,
            value: sex_cell.to_string(),
        })?;

    let age = whole(row, Column::Age, number)?;
    let kyu = rank(row, Column::Kyu, number)?;
    let dan = rank(row, Column::Dan, number)?;

    let kata = if entries.kata() {
        Some(read_kata(row, number)?)
    } else {
        None
    };
    let kumite = if entries.kumite() {
        Some(read_kumite(row, number, age)?)
    } else {
        None
    };

    Ok(ParticipantRecord {
        row: number,
        full_name: cell(row, Column::Name.index()).to_string(),
        sex,
        age,
        kyu,
        dan,
        city: cell(row, Column::City.index()).to_string(),
        coach: cell(row, Column::Coach.index()).to_string(),
        kata,
        kumite,
    })
}

fn read_kata(row: &[String], number: usize) -> Result<KataEntry, RowError> {
    let flag = cell(row, Column::GroupFlag.index());
    let group = match flag.to_lowercase().as_str() {
        "" | "no" | "n" | "нет" | "н" => false,
        "yes" | "y" | "да" | "д" => true,
        _ => {
            return Err(RowError::InvalidFlag {
                row: number,
                value: flag.to_string(),
            });
        }
    };
    Ok(KataEntry { group })
}

fn read_kumite(row: &[String], number: usize, age: u32) -> Result<KumiteEntry, RowError> {
    let weight_cell = cell(row, Column::Weight.index());
    let weight = weight_cell
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite() && *w > 0.0)
        .ok_or_else(|| invalid(number, Column::Weight, weight_cell))?;

    let bound = cell(row, Column::DeclaredBound.index());
    let declared =
        declared_bin(bound, age).ok_or_else(|| invalid(number, Column::DeclaredBound, bound))?;

    Ok(KumiteEntry { weight, declared })
}

/// Converts a declared kumite category into a weight bin.
///
/// `N+` is `[N, ∞)`. A plain `N` (optionally written `-N`) is the bin ending
/// at `N` inclusive: ten kilograms wide for adults, five for minors.
#[must_use]
pub fn declared_bin(value: &str, age: u32) -> Option<CategoryBin> {
    let value = value.trim();
    if let Some(lower) = value.strip_suffix('+') {
        return parse_int(lower).map(CategoryBin::from);
    }

    let upper = parse_int(value.strip_prefix('-').unwrap_or(value))?;
    let width = if age >= ADULT_AGE { 10 } else { 5 };
    Some(CategoryBin::new(upper - width, upper + 1))
}

fn parse_int(value: &str) -> Option<i32> {
    let value = value.trim();
    value
        .strip_suffix(".0")
        .unwrap_or(value)
        .parse::<i32>()
        .ok()
        .filter(|n| *n > 0)
}

fn whole(row: &[String], column: Column, number: usize) -> Result<u32, RowError> {
    let value = cell(row, column.index());
    value
        .strip_suffix(".0")
        .unwrap_or(value)
        .parse::<u32>()
        .map_err(|_| invalid(number, column, value))
}

fn rank(row: &[String], column: Column, number: usize) -> Result<u32, RowError> {
    if cell(row, column.index()).is_empty() {
        return Ok(0);
    }
    whole(row, column, number)
}

fn invalid(row: usize, column: Column, value: &str) -> RowError {
    RowError::InvalidNumber {
        row,
        column,
        value: value.to_string(),
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map_or("", |c| c.trim())
}

/// Position of the last non-empty cell plus one.
fn width(row: &[String]) -> usize {
    row.iter()
        .rposition(|c| !c.trim().is_empty())
        .map_or(0, |last| last + 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn header() -> Vec<Row> {
        let mut rows = vec![vec!["Registration".to_string()]; METADATA_ROWS];
        rows[1] = vec!["5f1c2a4e-0000-4000-8000-000000000001".to_string()];
        rows
    }

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(ToString::to_string).collect()
    }

    fn sheet(data: &[&[&str]]) -> Vec<Row> {
        let mut rows = header();
        rows.extend(data.iter().map(|cells| row(cells)));
        rows
    }

    #[test]
    fn kata_row() {
        let rows = sheet(&[&[
            "Anna Petrova", "ж", "13", "8", "Kazan", "кат", "нет", "", "", "Ivanov", "",
        ]]);
        let result = classify(&rows).unwrap();

        assert_eq!(result.submission_id, "5f1c2a4e-0000-4000-8000-000000000001");
        assert_eq!(result.error_percent, 0.0);
        let p = &result.participants[0];
        assert_eq!(p.row, 7);
        assert_eq!(p.sex, Sex::Female);
        assert_eq!(p.age, 13);
        assert_eq!(p.kyu, 8);
        assert_eq!(p.dan, 0);
        assert_eq!(p.kata, Some(KataEntry { group: false }));
        assert_eq!(p.kumite, None);
        assert_eq!(p.coach, "Ivanov");
    }

    #[test]
    fn combined_row_reads_both_layouts() {
        let rows = sheet(&[&[
            "Oleg Sidorov", "m", "25", "", "Tver", "kata/kumite", "yes", "67,5", "70", "Petrov", "1",
        ]]);
        let p = &classify(&rows).unwrap().participants[0];

        assert_eq!(p.kata, Some(KataEntry { group: true }));
        let kumite = p.kumite.unwrap();
        assert_eq!(kumite.weight, 67.5);
        assert_eq!(kumite.declared, CategoryBin::new(60, 71));
        assert_eq!(p.dan, 1);
    }

    #[test]
    fn declared_bins() {
        assert_eq!(declared_bin("84+", 30), Some(CategoryBin::from(84)));
        assert_eq!(declared_bin("-60", 30), Some(CategoryBin::new(50, 61)));
        assert_eq!(declared_bin("40", 13), Some(CategoryBin::new(35, 41)));
        assert_eq!(declared_bin("40.0", 13), Some(CategoryBin::new(35, 41)));
        assert_eq!(declared_bin("heavy", 30), None);
        assert_eq!(declared_bin("", 30), None);
    }

    #[test]
    fn unknown_discipline_counts_as_error() {
        let rows = sheet(&[
            &["A", "m", "20", "", "X", "judo", "", "", "", "", ""],
            &["B", "m", "20", "", "X", "кат", "", "", "", "", ""],
        ]);
        let result = classify(&rows).unwrap();

        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.error_percent, 50.0);
        assert!(result.is_acceptable());
        assert!(matches!(
            result.row_errors[0],
            RowError::UnknownDiscipline { row: 7, .. }
        ));
    }

    #[test]
    fn missing_required_cells_are_reported_but_not_rated() {
        let rows = sheet(&[
            &["A", "m", "20", "", "", "кат"],
            &["B", "f", "20", "", "Y", "кат"],
            &[],
            &["", "", "", "", "", "", "", "", "", ""],
        ]);
        let result = classify(&rows).unwrap();

        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.error_percent, 0.0);
        assert_eq!(
            result.row_errors,
            vec![RowError::MissingCell {
                row: 7,
                column: Column::City
            }]
        );
    }

    #[test]
    fn conversion_failures_reject_sheet() {
        let rows = sheet(&[
            &["A", "m", "twenty", "", "X", "кат"],
            &["B", "m", "20", "", "X", "кум", "", "70", "?"],
            &["C", "m", "20", "", "X", "кат"],
        ]);
        let result = classify(&rows).unwrap();

        assert!(result.error_percent > MAX_ERROR_PERCENT);
        assert!(!result.is_acceptable());
        assert_eq!(result.participants.len(), 1);
        assert!(matches!(
            result.row_errors[1],
            RowError::InvalidNumber {
                column: Column::DeclaredBound,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_names() {
        let rows = sheet(&[
            &["A", "m", "20", "", "X", "кат"],
            &["A", "m", "20", "", "X", "кат"],
        ]);
        let result = classify(&rows).unwrap();
        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.row_errors[0].row(), 8);
    }

    #[test]
    fn refuses_oversized_sheet() {
        let rows = vec![row(&["x"]); MAX_ROWS + 1];
        assert_eq!(
            classify(&rows),
            Err(ClassifyError::TooManyRows {
                rows: MAX_ROWS + 1,
                limit: MAX_ROWS
            })
        );
    }

    #[test]
    fn refuses_spam() {
        let wide: Vec<&str> = vec!["x"; LONG_ROW_CELLS + 1];
        let mut rows = header();
        rows.extend(std::iter::repeat_n(row(&wide), SPAM_LONG_ROWS + 1));
        assert_eq!(
            classify(&rows),
            Err(ClassifyError::SpamSuspected {
                long_rows: SPAM_LONG_ROWS + 1
            })
        );
    }

    #[test]
    fn wide_metadata_rows_are_not_spam() {
        let wide: Vec<&str> = vec!["x"; LONG_ROW_CELLS + 1];
        let mut rows = header();
        for meta in &mut rows {
            meta.extend(std::iter::repeat_n("note".to_string(), LONG_ROW_CELLS + 1));
        }
        rows.extend(std::iter::repeat_n(row(&wide), SPAM_LONG_ROWS));

        let result = classify(&rows).unwrap();
        assert!(result.participants.is_empty());
        assert_eq!(result.row_errors.len(), SPAM_LONG_ROWS);
    }

    #[test]
    fn trailing_empty_cells_do_not_make_rows_long() {
        let mut cells = vec!["A", "m", "20", "", "X", "кат"];
        cells.extend(std::iter::repeat_n("", 30));
        let mut rows = header();
        rows.extend(std::iter::repeat_n(row(&cells), SPAM_LONG_ROWS + 1));
        assert!(classify(&rows).is_ok());
    }

    #[test]
    fn requires_submission_id() {
        let mut rows = header();
        rows[1] = row(&[""]);
        assert_eq!(classify(&rows), Err(ClassifyError::MissingSubmissionId));
    }

    #[test]
    fn discipline_tokens() {
        assert_eq!(Entries::parse("кат/кум"), Some(Entries::Both));
        assert_eq!(Entries::parse("kumite"), Some(Entries::Kumite));
        assert_eq!(Entries::parse("кат/кат"), None);
        assert_eq!(Entries::parse("кат/кум/кат"), None);
        assert_eq!(Entries::parse("кат/"), None);
    }
}
