//! Registration spreadsheets: reading cells and classifying rows.

mod classify;
mod reader;

pub use classify::{
    ClassifiedSheet, ClassifyError, Column, KataEntry, KumiteEntry, LONG_ROW_CELLS, MAX_ERROR_PERCENT,
    MAX_ROWS, METADATA_ROWS, ParticipantRecord, Row, RowError, SPAM_LONG_ROWS, classify,
    declared_bin,
};
pub use reader::{DEFAULT_SHEET, SheetReader, XlsxReader};
