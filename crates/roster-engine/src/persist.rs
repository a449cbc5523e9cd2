//! Writing the roster back to a spreadsheet file in canonical form.

use std::path::{Path, PathBuf};

use roster_model::{CellValue, Table};
use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cannot write roster files with extension {0:?}; save as .xlsx or .csv instead")]
    UnsupportedTarget(String),
    #[error("roster has {0} columns; a worksheet holds at most {max}", max = XLSX_MAX_COLUMNS)]
    TooManyColumns(usize),
    #[error("roster has {0} rows; a worksheet holds at most {max}", max = XLSX_MAX_ROWS - 1)]
    TooManyRows(usize),
    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("failed to build csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const XLSX_MAX_COLUMNS: usize = 16_384;
/// Including the header row.
const XLSX_MAX_ROWS: usize = 1_048_576;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TargetFormat {
    Xlsx,
    Delimited(u8),
}

fn target_format(path: &Path) -> Result<TargetFormat, PersistError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xlsm" => Ok(TargetFormat::Xlsx),
        "csv" | "txt" => Ok(TargetFormat::Delimited(b',')),
        "tsv" => Ok(TargetFormat::Delimited(b'\t')),
        _ => Err(PersistError::UnsupportedTarget(ext)),
    }
}

/// Whether [`write_table`] can produce a file at `path`.
pub fn is_supported_target(path: &Path) -> bool {
    target_format(path).is_ok()
}

/// Atomically replace `path` with `table`: one header row, then one row per record.
pub fn write_table(table: &Table, path: &Path) -> Result<(), PersistError> {
    let bytes = match target_format(path)? {
        TargetFormat::Xlsx => xlsx_bytes(table)?,
        TargetFormat::Delimited(delimiter) => delimited_bytes(table, delimiter)?,
    };
    roster_fs::atomic_write_bytes(path, &bytes).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("saved {} rows to {}", table.len(), path.display());
    Ok(())
}

fn xlsx_bytes(table: &Table) -> Result<Vec<u8>, PersistError> {
    let width = table.columns().len();
    if width > XLSX_MAX_COLUMNS {
        return Err(PersistError::TooManyColumns(width));
    }
    if table.len() >= XLSX_MAX_ROWS {
        return Err(PersistError::TooManyRows(table.len()));
    }
    let column =
        |col: usize| u16::try_from(col).map_err(|_| PersistError::TooManyColumns(width));

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, label) in table.columns().iter().enumerate() {
        worksheet.write_string(0, column(col)?, label)?;
    }
    for (row, cells) in table.rows().iter().enumerate() {
        let row = u32::try_from(row + 1).map_err(|_| PersistError::TooManyRows(table.len()))?;
        for (col, cell) in cells.iter().enumerate() {
            let col = column(col)?;
            match cell {
                CellValue::Empty => {}
                CellValue::Number(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                CellValue::Text(s) if s.is_empty() => {}
                CellValue::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
                CellValue::Boolean(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn delimited_bytes(table: &Table, delimiter: u8) -> Result<Vec<u8>, PersistError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for cells in table.rows() {
        writer.write_record(cells.iter().map(|cell| cell.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| PersistError::Csv(err.into_error().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_model::{ColumnResolver, IngestionPipeline, Record};

    fn roster() -> Table {
        let mut table = Table::empty(&ColumnResolver::default());
        table.push_record(Record::new("Nguyễn Văn An").with_exam_code("701").with_score(8.25));
        table.push_record(Record::new("Trần Thị Bình"));
        table
    }

    #[test]
    fn csv_output_reloads_to_the_same_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lop.csv");
        let table = roster();
        write_table(&table, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Tên Học Sinh,Mã Đề,Điểm\n"));
        assert!(text.contains("Nguyễn Văn An,701,8.25\n"));

        let reloaded = IngestionPipeline::default().load(&path).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn xlsx_output_reloads_to_the_same_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lop.xlsx");
        let table = roster();
        write_table(&table, &path).unwrap();

        let reloaded = IngestionPipeline::default().load(&path).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn oversized_schema_is_refused_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lop.xlsx");
        let labels = (0..=u16::MAX as usize).map(|i| format!("C{i}")).collect();
        let table = Table::from_rows(labels, Vec::new(), &ColumnResolver::default());
        let width = table.columns().len();
        assert!(width > usize::from(u16::MAX));

        let err = write_table(&table, &path).unwrap_err();
        assert!(matches!(err, PersistError::TooManyColumns(n) if n == width));
        assert!(!path.exists());

        let csv = dir.path().join("lop.csv");
        write_table(&table, &csv).unwrap();
        assert!(csv.exists());
    }

    #[test]
    fn legacy_formats_are_not_write_targets() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_table(&roster(), &dir.path().join("lop.xls")).unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedTarget(ext) if ext == "xls"));
        assert!(is_supported_target(Path::new("lop.XLSX")));
    }
}
