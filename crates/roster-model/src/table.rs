use crate::columns::{ColumnMap, ColumnMatch, ColumnResolver, MatchKind, SemanticField};
use crate::error::ValidationError;
use crate::normalize;
use crate::text::fold;
use crate::value::CellValue;

/// The roster: an ordered list of rows over a fixed column schema.
///
/// Every row has exactly `columns().len()` cells. The three semantic columns are always
/// present (synthesized when the source lacked them) and are located through
/// [`Table::column_map`].
#[derive(Clone, Debug)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    column_map: ColumnMap,
    /// Positions of the semantic columns, in [`SemanticField::ALL`] order.
    fields: [usize; 3],
    source_header_row: Option<usize>,
}

impl PartialEq for Table {
    /// Tables are equal when their schema, cells and semantic column positions match.
    ///
    /// How a column was matched (exact/alias/synthesized) and where the header sat in the
    /// source file are load-time diagnostics and are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.rows == other.rows
            && self.fields == other.fields
    }
}

/// Owned input for a new roster row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub name: String,
    /// Empty string means "unset".
    pub exam_code: String,
    /// `None` means "ungraded".
    pub score: Option<f64>,
    /// Passthrough cells keyed by column label. Unknown labels are ignored.
    pub extra: Vec<(String, CellValue)>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_exam_code(mut self, exam_code: impl Into<String>) -> Self {
        self.exam_code = exam_code.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_extra(mut self, label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.extra.push((label.into(), value.into()));
        self
    }
}

/// Borrowed view of one row.
#[derive(Clone, Copy, Debug)]
pub struct RecordView<'a> {
    table: &'a Table,
    row: usize,
}

impl<'a> RecordView<'a> {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn name(&self) -> &'a str {
        self.semantic_text(SemanticField::Name)
    }

    pub fn exam_code(&self) -> &'a str {
        self.semantic_text(SemanticField::ExamCode)
    }

    pub fn score(&self) -> Option<f64> {
        self.table
            .semantic_cell(self.row, SemanticField::Score)
            .and_then(CellValue::as_number)
    }

    /// Look up any cell by its column label.
    pub fn get(&self, label: &str) -> Option<&'a CellValue> {
        let col = self.table.column_index(label)?;
        self.table.rows[self.row].get(col)
    }

    pub fn cells(&self) -> &'a [CellValue] {
        &self.table.rows[self.row]
    }

    fn semantic_text(&self, field: SemanticField) -> &'a str {
        self.table
            .semantic_cell(self.row, field)
            .and_then(CellValue::as_text)
            .unwrap_or("")
    }
}

impl Table {
    /// An empty roster with just the canonical columns.
    pub fn empty(resolver: &ColumnResolver) -> Self {
        Self::assemble(Vec::new(), Vec::new(), resolver.resolve::<String>(&[]), resolver)
    }

    /// Build a normalized table from raw header labels and raw cells.
    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
        resolver: &ColumnResolver,
    ) -> Self {
        let map = resolver.resolve(&columns);
        normalize::normalize(Self::assemble(columns, rows, map, resolver))
    }

    /// Combine columns, rows and a (possibly partial) column map into a table, padding ragged
    /// rows and synthesizing any semantic column the map could not resolve.
    ///
    /// The result is *not* normalized.
    pub(crate) fn assemble(
        mut columns: Vec<String>,
        mut rows: Vec<Vec<CellValue>>,
        mut column_map: ColumnMap,
        resolver: &ColumnResolver,
    ) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        while columns.len() < width {
            let label = unique_label(&columns, &format!("Column{}", columns.len() + 1));
            columns.push(label);
        }
        for row in &mut rows {
            row.resize(columns.len(), CellValue::Empty);
        }

        let mut fields = [0; 3];
        for (slot, field) in SemanticField::ALL.into_iter().enumerate() {
            if let Some(index) = column_map.index(field) {
                fields[slot] = index;
                continue;
            }
            let label = unique_label(&columns, resolver.canonical().label(field));
            let index = columns.len();
            columns.push(label.clone());
            for (i, row) in rows.iter_mut().enumerate() {
                row.push(match field {
                    SemanticField::Name => CellValue::Text(placeholder_name(i)),
                    SemanticField::ExamCode | SemanticField::Score => CellValue::Empty,
                });
            }
            fields[slot] = index;
            log::debug!("synthesized missing {field} column as {label:?}");
            column_map.set(
                field,
                ColumnMatch {
                    index,
                    label,
                    kind: MatchKind::Synthesized,
                },
            );
        }

        Self {
            columns,
            rows,
            column_map,
            fields,
            source_header_row: None,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }

    /// Index of the header row in the source file, when the table came from ingestion.
    pub fn source_header_row(&self) -> Option<usize> {
        self.source_header_row
    }

    pub(crate) fn set_source_header_row(&mut self, row: Option<usize>) {
        self.source_header_row = row;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<CellValue>] {
        &mut self.rows
    }

    pub fn record(&self, row: usize) -> Option<RecordView<'_>> {
        (row < self.rows.len()).then_some(RecordView { table: self, row })
    }

    pub fn records(&self) -> impl Iterator<Item = RecordView<'_>> + '_ {
        (0..self.rows.len()).map(move |row| RecordView { table: self, row })
    }

    /// Position of a column by label (case-insensitive).
    pub fn column_index(&self, label: &str) -> Option<usize> {
        let target = fold(label.trim());
        self.columns
            .iter()
            .position(|c| fold(c.trim()) == target)
    }

    /// Schema position of a semantic field.
    pub fn field_index(&self, field: SemanticField) -> usize {
        let slot = match field {
            SemanticField::Name => 0,
            SemanticField::ExamCode => 1,
            SemanticField::Score => 2,
        };
        self.fields[slot]
    }

    fn semantic_cell(&self, row: usize, field: SemanticField) -> Option<&CellValue> {
        self.rows.get(row)?.get(self.field_index(field))
    }

    /// Number of rows that carry a score.
    pub fn scored_count(&self) -> usize {
        self.records().filter(|r| r.score().is_some()).count()
    }

    /// First row whose folded name equals `name`'s folded form.
    pub fn find_name(&self, name: &str) -> Option<usize> {
        let target = fold(name.trim());
        self.records()
            .find(|r| fold(r.name().trim()) == target)
            .map(|r| r.row())
    }

    pub fn check_row(&self, row: usize) -> Result<(), ValidationError> {
        if row < self.rows.len() {
            Ok(())
        } else {
            Err(ValidationError::RowOutOfRange {
                row,
                len: self.rows.len(),
            })
        }
    }

    /// Append a record and return its row index. The row is normalized.
    pub fn push_record(&mut self, record: Record) -> usize {
        let mut row = vec![CellValue::Empty; self.columns.len()];
        for (label, value) in record.extra {
            if let Some(col) = self.column_index(&label) {
                row[col] = value;
            }
        }
        row[self.field_index(SemanticField::Name)] = CellValue::Text(record.name);
        row[self.field_index(SemanticField::ExamCode)] = CellValue::Text(record.exam_code);
        row[self.field_index(SemanticField::Score)] =
            record.score.map_or(CellValue::Empty, CellValue::number);

        normalize::normalize_row(&mut row, &self.column_map);
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn remove_row(&mut self, row: usize) -> Result<Vec<CellValue>, ValidationError> {
        self.check_row(row)?;
        Ok(self.rows.remove(row))
    }

    /// Overwrite a semantic cell and re-normalize the row.
    pub fn set_field(
        &mut self,
        row: usize,
        field: SemanticField,
        value: CellValue,
    ) -> Result<(), ValidationError> {
        self.check_row(row)?;
        let col = self.field_index(field);
        let cells = &mut self.rows[row];
        cells[col] = value;
        normalize::normalize_row(cells, &self.column_map);
        Ok(())
    }

    pub fn set_score(&mut self, row: usize, score: Option<f64>) -> Result<(), ValidationError> {
        self.set_field(
            row,
            SemanticField::Score,
            score.map_or(CellValue::Empty, CellValue::number),
        )
    }

    pub fn set_exam_code(&mut self, row: usize, exam_code: &str) -> Result<(), ValidationError> {
        self.set_field(
            row,
            SemanticField::ExamCode,
            CellValue::Text(exam_code.to_string()),
        )
    }
}

/// Name given to rows of a source that had no recognizable name column (1-based).
pub(crate) fn placeholder_name(row: usize) -> String {
    format!("Student {}", row + 1)
}

fn unique_label(existing: &[String], desired: &str) -> String {
    let taken = |label: &str| {
        let folded = fold(label);
        existing.iter().any(|c| fold(c) == folded)
    };
    if !taken(desired) {
        return desired.to_string();
    }
    (2..)
        .map(|n| format!("{desired} ({n})"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| desired.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn field_index_follows_resolved_and_synthesized_columns() {
        let table = Table::from_rows(
            vec!["Điểm".into(), "Lớp".into(), "Họ và tên".into()],
            vec![vec![CellValue::number(6.0), text("12A1"), text("An")]],
            &ColumnResolver::default(),
        );
        assert_eq!(table.field_index(SemanticField::Score), 0);
        assert_eq!(table.field_index(SemanticField::Name), 2);
        assert_eq!(table.field_index(SemanticField::ExamCode), 3);

        let mut table = table;
        table.set_exam_code(0, "702").unwrap();
        assert_eq!(table.rows()[0][3], text("702"));
        assert_eq!(table.record(0).unwrap().score(), Some(6.0));
    }

    #[test]
    fn missing_columns_are_synthesized() {
        let table = Table::from_rows(
            vec!["Lớp".into()],
            vec![vec![text("12A1")], vec![text("12A2")]],
            &ColumnResolver::default(),
        );

        assert_eq!(table.columns(), &["Lớp", "Tên Học Sinh", "Mã Đề", "Điểm"]);
        assert_eq!(table.record(0).unwrap().name(), "Student 1");
        assert_eq!(table.record(1).unwrap().name(), "Student 2");
        assert_eq!(table.record(1).unwrap().exam_code(), "");
        assert_eq!(table.record(1).unwrap().score(), None);
        assert_eq!(
            table.column_map().missing(),
            vec![
                SemanticField::Name,
                SemanticField::ExamCode,
                SemanticField::Score
            ]
        );
    }

    #[test]
    fn ragged_rows_are_padded_and_extended() {
        let table = Table::from_rows(
            vec!["Họ và tên".into(), "Điểm".into()],
            vec![vec![text("An")], vec![text("Bình"), text("7"), text("extra")]],
            &ColumnResolver::default(),
        );
        assert_eq!(
            table.columns(),
            &["Họ và tên", "Điểm", "Column3", "Mã Đề"]
        );
        assert!(table.rows().iter().all(|r| r.len() == 4));
        assert_eq!(table.record(1).unwrap().score(), Some(7.0));
        assert_eq!(
            table.record(1).unwrap().get("column3"),
            Some(&text("extra"))
        );
    }

    #[test]
    fn synthesized_label_avoids_collisions() {
        let resolver = ColumnResolver::default();
        // "Điểm" is claimed as the name column via exact match on a customized label, so the
        // synthesized score column must pick a different label.
        let resolver = ColumnResolver::new(
            crate::CanonicalColumns {
                name: "Điểm".into(),
                ..resolver.canonical().clone()
            },
            crate::ColumnAliases {
                score: Vec::new(),
                ..Default::default()
            },
        );
        let table = Table::from_rows(vec!["Điểm".into()], vec![], &resolver);
        assert_eq!(table.columns(), &["Điểm", "Mã Đề", "Điểm (2)"]);
    }

    #[test]
    fn push_record_fills_passthrough_by_label() {
        let mut table = Table::from_rows(
            vec!["Tên học sinh".into(), "Lớp".into()],
            vec![],
            &ColumnResolver::default(),
        );
        let row = table.push_record(
            Record::new("  Trần Văn B ")
                .with_exam_code("702")
                .with_score(9.5)
                .with_extra("lớp", "12A3")
                .with_extra("unknown", "ignored"),
        );
        let record = table.record(row).unwrap();
        assert_eq!(record.name(), "Trần Văn B");
        assert_eq!(record.exam_code(), "702");
        assert_eq!(record.score(), Some(9.5));
        assert_eq!(record.get("Lớp"), Some(&text("12A3")));
    }

    #[test]
    fn edits_report_out_of_range_rows() {
        let mut table = Table::empty(&ColumnResolver::default());
        assert_eq!(
            table.set_score(3, Some(5.0)),
            Err(ValidationError::RowOutOfRange { row: 3, len: 0 })
        );
        assert!(table.remove_row(0).is_err());
    }

    #[test]
    fn find_name_is_case_insensitive() {
        let mut table = Table::empty(&ColumnResolver::default());
        table.push_record(Record::new("Nguyễn Văn A"));
        assert_eq!(table.find_name("NGUYỄN VĂN A"), Some(0));
        assert_eq!(table.find_name("Nguyễn Văn"), None);
    }
}
