use pretty_assertions::assert_eq;
use roster_model::{
    ColumnResolver, IngestionError, IngestionPipeline, LoadOptions, LoadProgress, SemanticField,
};
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;

#[test]
fn workbook_with_title_rows_is_loaded_from_detected_header() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lop12a1.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "TRƯỜNG THPT LÊ LỢI").unwrap();
    // Row 1 left blank.
    for (col, label) in ["STT", "Họ và tên", "Mã đề", "Điểm", "Ghi chú"].iter().enumerate() {
        sheet.write_string(2, col as u16, *label).unwrap();
    }
    sheet.write_number(3, 0, 1.0).unwrap();
    sheet.write_string(3, 1, "Nguyễn Văn An").unwrap();
    sheet.write_number(3, 2, 701.0).unwrap();
    sheet.write_number(3, 3, 8.25).unwrap();
    sheet.write_number(4, 0, 2.0).unwrap();
    sheet.write_string(4, 1, "Trần Thị Bình").unwrap();
    sheet.write_string(4, 2, "nan").unwrap();
    sheet.write_string(4, 4, "vắng").unwrap();
    workbook.save(&path).expect("save fixture");

    let table = IngestionPipeline::default().load(&path).expect("load workbook");

    assert_eq!(table.source_header_row(), Some(2));
    assert_eq!(
        table.columns(),
        &["STT", "Họ và tên", "Mã đề", "Điểm", "Ghi chú"]
    );
    assert_eq!(table.len(), 2);

    let an = table.record(0).unwrap();
    assert_eq!(an.name(), "Nguyễn Văn An");
    assert_eq!(an.exam_code(), "701");
    assert_eq!(an.score(), Some(8.25));

    let binh = table.record(1).unwrap();
    assert_eq!(binh.exam_code(), "");
    assert_eq!(binh.score(), None);
    assert_eq!(binh.get("Ghi chú").and_then(|c| c.as_text()), Some("vắng"));
    assert!(table.column_map().missing().is_empty());
}

#[test]
fn csv_file_with_title_rows_reports_header_index() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("diem.csv");
    std::fs::write(
        &path,
        "Sở GD&ĐT,,\nKỳ thi giữa kỳ,,\n,,\nTên học sinh,Mã đề,Điểm\nLê Văn Cường,702,9\n",
    )
    .unwrap();

    let table = IngestionPipeline::default().load(&path).expect("load csv");
    // The comma-only line is a record of empty fields, so it counts as a row.
    assert_eq!(table.source_header_row(), Some(3));
    assert_eq!(table.len(), 1);
    assert_eq!(table.record(0).unwrap().score(), Some(9.0));
}

#[test]
fn missing_semantic_columns_are_reported_not_fatal() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("names.csv");
    std::fs::write(&path, "Họ và tên,Lớp\nAn,12A1\nBình,12A1\n").unwrap();

    let table = IngestionPipeline::default().load(&path).expect("load csv");
    assert_eq!(
        table.column_map().missing(),
        vec![SemanticField::ExamCode, SemanticField::Score]
    );
    assert_eq!(table.scored_count(), 0);
    assert_eq!(table.columns().len(), 4);
}

#[test]
fn chunked_file_load_reports_progress() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("big.csv");
    let mut csv = String::from("Họ và tên,Điểm\n");
    for i in 0..25 {
        csv.push_str(&format!("HS {i},{}\n", i % 10));
    }
    std::fs::write(&path, csv).unwrap();

    let pipeline = IngestionPipeline::new(
        ColumnResolver::default(),
        LoadOptions {
            chunked: true,
            chunk_size: 10,
            ..Default::default()
        },
    );
    let mut last = LoadProgress::default();
    let table = pipeline
        .load_with_progress(&path, &mut |p| last = p)
        .expect("chunked load");

    assert_eq!(table.len(), 25);
    assert_eq!(
        last,
        LoadProgress {
            rows_read: 25,
            chunks: 3
        }
    );
}

#[test]
fn unreadable_sources_surface_their_cause() {
    let dir = tempdir().expect("tempdir");

    let err = IngestionPipeline::default()
        .load(&dir.path().join("missing.csv"))
        .expect_err("missing file");
    assert!(matches!(err, IngestionError::Open { .. }));

    let corrupt = dir.path().join("corrupt.xlsx");
    std::fs::write(&corrupt, b"not a zip archive").unwrap();
    let err = IngestionPipeline::default()
        .load(&corrupt)
        .expect_err("corrupt workbook");
    assert!(matches!(err, IngestionError::Workbook { .. }));

    let err = IngestionPipeline::default()
        .load(&dir.path().join("notes.docx"))
        .expect_err("unsupported");
    assert!(matches!(err, IngestionError::UnsupportedFormat(_)));
}
