//! Reading roster tables from CSV text and spreadsheet workbooks.
//!
//! Teachers' sheets often carry a school name or a title above the real header, so the
//! header row is located heuristically before the column schema is resolved.

use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use csv::ByteRecord;
use encoding_rs::WINDOWS_1258;

use crate::columns::{ColumnMap, ColumnResolver};
use crate::error::IngestionError;
use crate::normalize::{normalize_in_place, normalize_rows};
use crate::table::Table;
use crate::text::fold;
use crate::value::CellValue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// Decode as UTF-8; a field with invalid UTF-8 falls back to Windows-1258.
    ///
    /// Vietnamese Excel installs export CSV in Windows-1258 by default.
    #[default]
    Auto,
    /// Decode as UTF-8 and reject invalid byte sequences.
    Utf8,
    Windows1258,
}

#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Read and normalize the source in chunks of `chunk_size` rows.
    pub chunked: bool,
    pub chunk_size: usize,
    /// How many leading rows are inspected when looking for the header.
    pub header_scan_rows: usize,
    pub encoding: TextEncoding,
    /// Field delimiter for delimited text. `None` picks one from the file extension.
    pub delimiter: Option<u8>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunked: false,
            chunk_size: 1000,
            header_scan_rows: 20,
            encoding: TextEncoding::Auto,
            delimiter: None,
        }
    }
}

/// Reported after each chunk is normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadProgress {
    /// Data rows read so far (blank rows excluded).
    pub rows_read: usize,
    pub chunks: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited { delimiter: u8 },
    Workbook,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, IngestionError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(SourceFormat::Delimited { delimiter: b',' }),
            "tsv" => Ok(SourceFormat::Delimited { delimiter: b'\t' }),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(SourceFormat::Workbook),
            _ => Err(IngestionError::UnsupportedFormat(ext)),
        }
    }
}

/// Index of the first row with a cell containing one of `markers`.
///
/// `markers` must already be folded (see [`ColumnResolver::header_markers`]).
pub fn detect_header_row(rows: &[Vec<CellValue>], markers: &[String]) -> Option<usize> {
    rows.iter().position(|row| {
        row.iter().any(|cell| match cell {
            CellValue::Text(text) => {
                let folded = fold(text.trim());
                markers.iter().any(|marker| folded.contains(marker.as_str()))
            }
            _ => false,
        })
    })
}

/// Turns a source file into a normalized [`Table`].
#[derive(Clone, Debug, Default)]
pub struct IngestionPipeline {
    resolver: ColumnResolver,
    options: LoadOptions,
}

impl IngestionPipeline {
    pub fn new(resolver: ColumnResolver, options: LoadOptions) -> Self {
        Self { resolver, options }
    }

    pub fn resolver(&self) -> &ColumnResolver {
        &self.resolver
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn load(&self, path: &Path) -> Result<Table, IngestionError> {
        self.load_with_progress(path, &mut |_| {})
    }

    pub fn load_with_progress(
        &self,
        path: &Path,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Table, IngestionError> {
        log::info!("loading roster from {}", path.display());
        match SourceFormat::from_path(path)? {
            SourceFormat::Delimited { delimiter } => {
                let file = File::open(path).map_err(|source| IngestionError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
                self.read_delimited(file, self.options.delimiter.unwrap_or(delimiter), progress)
            }
            SourceFormat::Workbook => self.load_workbook(path, progress),
        }
    }

    /// Read delimited text from any reader (`,` unless [`LoadOptions::delimiter`] says otherwise).
    pub fn load_csv<R: Read>(
        &self,
        reader: R,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Table, IngestionError> {
        self.read_delimited(reader, self.options.delimiter.unwrap_or(b','), progress)
    }

    fn read_delimited<R: Read>(
        &self,
        reader: R,
        delimiter: u8,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Table, IngestionError> {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            // Header detection is ours.
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let rows = CsvRows {
            reader,
            record: ByteRecord::new(),
            row: 0,
            encoding: self.options.encoding,
        };
        self.ingest(rows, 0, progress)
    }

    fn load_workbook(
        &self,
        path: &Path,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Table, IngestionError> {
        let workbook_error = |err: calamine::Error| IngestionError::Workbook {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
        let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
            return Err(IngestionError::NoWorksheet {
                path: path.to_path_buf(),
            });
        };
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(workbook_error)?;

        let row_offset = range.start().map_or(0, |(row, _)| row as usize);
        let rows = range
            .rows()
            .map(|cells| Ok(cells.iter().map(cell_from_data).collect()));
        self.ingest(rows, row_offset, progress)
    }

    fn ingest<I>(
        &self,
        mut rows: I,
        row_offset: usize,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Table, IngestionError>
    where
        I: Iterator<Item = Result<Vec<CellValue>, IngestionError>>,
    {
        let mut head = Vec::new();
        while head.len() < self.options.header_scan_rows.max(1) {
            match rows.next() {
                Some(row) => head.push(row?),
                None => break,
            }
        }

        let markers = self.resolver.header_markers();
        let header =
            detect_header_row(&head, &markers).or_else(|| (!head.is_empty()).then_some(0));
        let Some(header) = header else {
            log::info!("source has no rows");
            return Ok(Table::empty(&self.resolver));
        };

        let columns = header_labels(&head[header]);
        let map = self.resolver.resolve(&columns);

        let chunk_size = if self.options.chunked {
            self.options.chunk_size.max(1)
        } else {
            usize::MAX
        };
        let mut state = LoadProgress::default();
        let mut loaded = Vec::new();
        let mut pending = Vec::new();

        for row in head.drain(header + 1..).map(Ok).chain(rows) {
            let row = row?;
            if is_blank_row(&row) {
                continue;
            }
            state.rows_read += 1;
            pending.push(row);
            if pending.len() >= chunk_size {
                flush_chunk(&mut pending, &mut loaded, &map, &mut state, progress);
            }
        }
        if !pending.is_empty() {
            flush_chunk(&mut pending, &mut loaded, &map, &mut state, progress);
        }

        let mut table = Table::assemble(columns, loaded, map, &self.resolver);
        normalize_in_place(&mut table);
        table.set_source_header_row(Some(row_offset + header));

        log::info!(
            "loaded {} rows in {} chunk(s), header at row {}",
            table.len(),
            state.chunks,
            row_offset + header
        );
        let missing = table.column_map().missing();
        if !missing.is_empty() {
            log::warn!("source has no column for: {missing:?}");
        }
        Ok(table)
    }
}

fn flush_chunk(
    pending: &mut Vec<Vec<CellValue>>,
    loaded: &mut Vec<Vec<CellValue>>,
    map: &ColumnMap,
    state: &mut LoadProgress,
    progress: &mut dyn FnMut(LoadProgress),
) {
    normalize_rows(pending, map);
    loaded.append(pending);
    state.chunks += 1;
    progress(*state);
}

fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}

fn header_labels(row: &[CellValue]) -> Vec<String> {
    row.iter()
        .enumerate()
        .map(|(i, cell)| {
            let label = cell.to_string().trim().to_string();
            if label.is_empty() {
                format!("Column{}", i + 1)
            } else {
                label
            }
        })
        .collect()
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.as_str()),
        Data::Float(f) => CellValue::number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) => CellValue::number(dt.as_f64()),
        other => CellValue::text(other.to_string()),
    }
}

struct CsvRows<R> {
    reader: csv::Reader<R>,
    record: ByteRecord,
    row: u64,
    encoding: TextEncoding,
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<Vec<CellValue>, IngestionError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                self.row += 1;
                Some(decode_record(&self.record, self.row, self.encoding))
            }
            Err(err) => Some(Err(map_csv_error(err, self.row + 1))),
        }
    }
}

fn decode_record(
    record: &ByteRecord,
    row: u64,
    encoding: TextEncoding,
) -> Result<Vec<CellValue>, IngestionError> {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            decode_field(field, row, idx as u64 + 1, encoding).map(|s| CellValue::text(s.trim()))
        })
        .collect()
}

fn decode_field(
    field: &[u8],
    row: u64,
    column: u64,
    encoding: TextEncoding,
) -> Result<Cow<'_, str>, IngestionError> {
    // Excel-exported CSVs commonly start with a UTF-8 BOM.
    let field = if row == 1 && column == 1 && field.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &field[3..]
    } else {
        field
    };

    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(field)
            .map(Cow::Borrowed)
            .map_err(|_| IngestionError::Encoding { row, column }),
        TextEncoding::Windows1258 => Ok(WINDOWS_1258.decode_without_bom_handling(field).0),
        TextEncoding::Auto => match std::str::from_utf8(field) {
            Ok(s) => Ok(Cow::Borrowed(s)),
            Err(_) => Ok(WINDOWS_1258.decode_without_bom_handling(field).0),
        },
    }
}

fn map_csv_error(err: csv::Error, fallback_row: u64) -> IngestionError {
    let reason = err.to_string();
    let pos = err.position().cloned();

    match err.into_kind() {
        csv::ErrorKind::Io(e) => IngestionError::Io(e),
        _ => {
            let row = pos
                .map(|p| p.record())
                .filter(|r| *r > 0)
                .unwrap_or(fallback_row);
            IngestionError::Csv { row, reason }
        }
    }
}
