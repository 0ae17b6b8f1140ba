//! Cell-level access to spreadsheet files.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use tracing::debug;

use super::classify::{ClassifyError, LONG_ROW_CELLS, MAX_ROWS, Row};

/// Sheet holding the registration table.
pub const DEFAULT_SHEET: &str = "Лист 1";

/// Turns an attachment into rows of trimmed cell text.
pub trait SheetReader: Send + Sync {
    /// Reads every row of the registration sheet.
    ///
    /// Row and column positions are absolute: a sheet whose first used cell
    /// is `B3` still yields rows `0` and `1` and column `0`, all empty.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Workbook`] if the file cannot be read.
    fn read_rows(&self, bytes: &[u8]) -> Result<Vec<Row>, ClassifyError>;
}

/// Reads `.xlsx` workbooks.
#[derive(Debug, Clone)]
pub struct XlsxReader {
    sheet: String,
}

impl XlsxReader {
    /// Reads the named sheet, falling back to the first one.
    #[must_use]
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
        }
    }
}

impl Default for XlsxReader {
    fn default() -> Self {
        Self::new(DEFAULT_SHEET)
    }
}

impl SheetReader for XlsxReader {
    fn read_rows(&self, bytes: &[u8]) -> Result<Vec<Row>, ClassifyError> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| ClassifyError::Workbook(e.to_string()))?;

        let names = workbook.sheet_names();
        let name = names
            .iter()
            .find(|name| **name == self.sheet)
            .or_else(|| names.first())
            .cloned()
            .ok_or_else(|| ClassifyError::Workbook("workbook has no sheets".into()))?;
        if name != self.sheet {
            debug!(expected = %self.sheet, using = %name, "Registration sheet not found by name");
        }

        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ClassifyError::Workbook(e.to_string()))?;

        let start = range.start().unwrap_or((0, 0));
        place(start, range.height(), range.rows().map(|cells| cells.iter().map(cell_text)))
    }
}

/// Pads rows that begin at `start` (zero-based row, column) so that cell
/// positions match the sheet.
///
/// Offsets that could never hold a registration are refused before any
/// padding is allocated.
fn place<R, C>(start: (u32, u32), height: usize, rows: R) -> Result<Vec<Row>, ClassifyError>
where
    R: Iterator<Item = C>,
    C: Iterator<Item = String>,
{
    let (first_row, first_col) = (start.0 as usize, start.1 as usize);

    let total = first_row.saturating_add(height);
    if total > MAX_ROWS {
        return Err(ClassifyError::TooManyRows {
            rows: total,
            limit: MAX_ROWS,
        });
    }
    // Column A carries the competition id.
    if first_col > LONG_ROW_CELLS {
        return Err(ClassifyError::MissingSubmissionId);
    }

    let mut placed: Vec<Row> = vec![Vec::new(); first_row];
    placed.extend(rows.map(|cells| {
        let mut row = vec![String::new(); first_col];
        row.extend(cells);
        trim_trailing(&mut row);
        row
    }));
    Ok(placed)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

fn trim_trailing(row: &mut Row) {
    while row.last().is_some_and(String::is_empty) {
        row.pop();
    }
}
