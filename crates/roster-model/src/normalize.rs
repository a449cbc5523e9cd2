//! Column-level type invariants for the semantic roster columns.
//!
//! After normalization:
//! - the score column holds only [`CellValue::Number`] (finite) or [`CellValue::Empty`]
//! - the exam-code column holds only [`CellValue::Text`]; `""` means unset
//! - the name column holds only [`CellValue::Text`], never empty cells
//!
//! Normalization never fails. Cells that cannot be coerced degrade to "absent" so downstream
//! code always sees a well-typed table. Passthrough columns are left untouched.

use crate::columns::{ColumnMap, SemanticField};
use crate::table::Table;
use crate::value::{format_number, CellValue};

/// Text values treated as a missing exam code (compared case-insensitively).
const MISSING_SENTINELS: &[&str] = &["nan", "none", "null", "<na>", "nat"];

/// Normalize a table. Idempotent: `normalize(normalize(t)) == normalize(t)`.
pub fn normalize(mut table: Table) -> Table {
    normalize_in_place(&mut table);
    table
}

pub fn normalize_in_place(table: &mut Table) {
    let map = table.column_map().clone();
    normalize_rows(table.rows_mut(), &map);
}

/// Normalize a batch of rows against a (possibly partial) column map.
///
/// Used per chunk during streaming ingestion, before the final table is assembled.
pub fn normalize_rows(rows: &mut [Vec<CellValue>], map: &ColumnMap) {
    let mut degraded = 0usize;
    for row in rows.iter_mut() {
        degraded += normalize_row(row, map);
    }
    if degraded > 0 {
        log::debug!("{degraded} score cell(s) could not be read as numbers and were cleared");
    }
}

/// Normalize one row in place. Returns the number of score cells that degraded to empty.
pub(crate) fn normalize_row(row: &mut [CellValue], map: &ColumnMap) -> usize {
    let mut degraded = 0;

    if let Some(cell) = map.index(SemanticField::Score).and_then(|i| row.get_mut(i)) {
        let coerced = coerce_score(cell);
        if coerced.is_none() && !cell.is_blank() {
            degraded += 1;
        }
        *cell = coerced.map_or(CellValue::Empty, CellValue::Number);
    }

    if let Some(cell) = map.index(SemanticField::ExamCode).and_then(|i| row.get_mut(i)) {
        *cell = CellValue::Text(coerce_exam_code(cell));
    }

    if let Some(cell) = map.index(SemanticField::Name).and_then(|i| row.get_mut(i)) {
        *cell = CellValue::Text(coerce_name(cell));
    }

    degraded
}

/// Read a score cell as a finite number.
pub fn coerce_score(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(s) => parse_score_text(s),
        _ => None,
    }
}

/// Parse user- or file-provided score text.
///
/// Accepts `.` as the decimal separator, or a single `,` when no `.` is present (`8,25`
/// as typed on Vietnamese-locale machines).
pub fn parse_score_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parsed = match text.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) if !text.contains('.') && text.matches(',').count() == 1 => {
            text.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn coerce_exam_code(cell: &CellValue) -> String {
    let text = match cell {
        CellValue::Empty => return String::new(),
        CellValue::Number(n) if !n.is_finite() => return String::new(),
        CellValue::Text(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if MISSING_SENTINELS
        .iter()
        .any(|sentinel| text.eq_ignore_ascii_case(sentinel))
    {
        String::new()
    } else {
        text
    }
}

pub fn coerce_name(cell: &CellValue) -> String {
    match cell {
        CellValue::Empty => String::new(),
        CellValue::Text(s) => s.trim().to_string(),
        CellValue::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}
