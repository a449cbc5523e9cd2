use std::path::PathBuf;

use thiserror::Error;

/// A source table could not be read.
///
/// An empty source is *not* an error: ingestion returns a table with zero rows so callers
/// can tell "no data" apart from "read failed".
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv parse error at row {row}: {reason}")]
    Csv { row: u64, reason: String },
    #[error("invalid UTF-8 at row {row}, column {column}")]
    Encoding { row: u64, column: u64 },
    #[error("failed to read workbook {}: {reason}", .path.display())]
    Workbook { path: PathBuf, reason: String },
    #[error("workbook {} has no worksheets", .path.display())]
    NoWorksheet { path: PathBuf },
    #[error("unsupported source format: {0:?}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An edit or a loaded table violates a roster rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("student name cannot be empty")]
    EmptyName,
    #[error("student {0:?} already exists")]
    DuplicateName(String),
    #[error("score {0} is outside the allowed range [0, 10]")]
    ScoreOutOfRange(f64),
    #[error("score {0:?} is not a number")]
    NonNumericScore(String),
    #[error("exam code {0:?} must be numeric")]
    NonNumericExamCode(String),
    #[error("correct answer count {count} exceeds the maximum of {max}")]
    CorrectCountOutOfRange { count: u32, max: u32 },
    #[error("no student selected")]
    NoSelection,
    #[error("row {row} is out of range (table has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },
    #[error("missing columns: {} (table has {rows} rows)", .missing.join(", "))]
    MissingColumns { missing: Vec<String>, rows: usize },
}
