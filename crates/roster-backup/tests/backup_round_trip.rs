use std::fs;

use pretty_assertions::assert_eq;
use roster_backup::{
    is_encrypted_container, sidecar_path, BackupCodec, ExportOptions, RestoreError, SecurityLevel,
    ENCRYPTION_METHOD,
};
use roster_model::{normalize, CellValue, ColumnResolver, Table};
use tempfile::tempdir;
use zeroize::Zeroizing;

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn sample_table() -> Table {
    Table::from_rows(
        vec![
            "STT".into(),
            "Họ và tên".into(),
            "Mã đề".into(),
            "Điểm".into(),
            "Đã nộp".into(),
        ],
        vec![
            vec![
                CellValue::Number(1.0),
                text("Nguyễn Văn An"),
                CellValue::Number(701.0),
                CellValue::Number(8.25),
                CellValue::Boolean(true),
            ],
            vec![
                CellValue::Number(2.0),
                text("Trần Thị Bình"),
                text("nan"),
                CellValue::Empty,
                CellValue::Boolean(false),
            ],
        ],
        &ColumnResolver::default(),
    )
}

fn encrypted(password: &str, level: SecurityLevel) -> ExportOptions {
    ExportOptions {
        password: Some(Zeroizing::new(password.to_string())),
        security_level: level,
        original_file: "lop12a1.xlsx".into(),
        app_version: "2.1.0".into(),
        ..Default::default()
    }
}

#[test]
fn plain_backup_round_trips() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("lop12a1_backup.json");
    let table = sample_table();
    let codec = BackupCodec::default();

    let record = codec
        .export(&table, &dest, &ExportOptions::default())
        .expect("export");
    assert!(!record.encrypted);
    assert_eq!(record.total_students, 2);
    assert_eq!(record.scored_students, 1);
    assert!(sidecar_path(&dest).is_file());

    let restored = codec.import(&dest, None, None).expect("import");
    assert_eq!(restored, normalize(table));
}

#[test]
fn encrypted_backup_round_trips_and_records_kdf_parameters() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("lop12a1_backup.enc");
    let table = sample_table();
    let codec = BackupCodec::default();

    let record = codec
        .export(&table, &dest, &encrypted("mật khẩu", SecurityLevel::Low))
        .expect("export");
    assert!(record.encrypted);
    assert_eq!(record.iterations, Some(50_000));
    assert_eq!(record.encryption_method.as_deref(), Some(ENCRYPTION_METHOD));
    assert_eq!(record.encryption_level, Some(SecurityLevel::Low));

    let on_disk = fs::read(&dest).expect("read payload");
    assert!(is_encrypted_container(&on_disk));
    assert!(!String::from_utf8_lossy(&on_disk).contains("Nguyễn"));

    let sidecar: serde_json::Value =
        serde_json::from_slice(&fs::read(sidecar_path(&dest)).unwrap()).unwrap();
    assert_eq!(sidecar["encrypted"], true);
    assert!(sidecar["salt"].as_str().is_some_and(|s| !s.is_empty()));

    let restored = codec
        .import(&dest, None, Some("mật khẩu"))
        .expect("import");
    assert_eq!(restored, normalize(table));
}

#[test]
fn high_level_round_trip_and_wrong_password() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("scenario_c.enc");
    let table = sample_table();
    let codec = BackupCodec::default();

    let record = codec
        .export(&table, &dest, &encrypted("pw", SecurityLevel::High))
        .expect("export");
    assert_eq!(record.iterations, Some(200_000));

    let restored = codec.import(&dest, None, Some("pw")).expect("import");
    assert_eq!(restored, normalize(table));

    let before = fs::read(&dest).unwrap();
    let err = codec
        .import(&dest, None, Some("wrong"))
        .expect_err("wrong password");
    assert!(matches!(err, RestoreError::AuthenticationFailed));
    // A failed restore leaves the encrypted file intact.
    assert_eq!(fs::read(&dest).unwrap(), before);
}

#[test]
fn encrypted_backup_requires_password() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("x.enc");
    let codec = BackupCodec::default();
    codec
        .export(&sample_table(), &dest, &encrypted("pw", SecurityLevel::Low))
        .expect("export");

    assert!(matches!(
        codec.import(&dest, None, None),
        Err(RestoreError::PasswordRequired)
    ));
    assert!(matches!(
        codec.import(&dest, None, Some("")),
        Err(RestoreError::PasswordRequired)
    ));
}

#[test]
fn encrypted_payload_without_metadata_fails_fast() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("x.enc");
    let codec = BackupCodec::default();
    codec
        .export(&sample_table(), &dest, &encrypted("pw", SecurityLevel::Low))
        .expect("export");
    fs::remove_file(sidecar_path(&dest)).unwrap();

    assert!(matches!(
        codec.import(&dest, None, Some("pw")),
        Err(RestoreError::MissingSalt)
    ));

    // Same container under a neutral extension is still recognized by its magic.
    let renamed = dir.path().join("x.bin");
    fs::rename(&dest, &renamed).unwrap();
    assert!(matches!(
        codec.import(&renamed, None, Some("pw")),
        Err(RestoreError::MissingSalt)
    ));
}

#[test]
fn metadata_can_live_elsewhere() {
    let dir = tempdir().expect("tempdir");
    let dest = dir.path().join("x.enc");
    let codec = BackupCodec::default();
    codec
        .export(&sample_table(), &dest, &encrypted("pw", SecurityLevel::Low))
        .expect("export");

    let moved = dir.path().join("meta.json");
    fs::rename(sidecar_path(&dest), &moved).unwrap();

    let restored = codec
        .import(&dest, Some(&moved), Some("pw"))
        .expect("import with explicit metadata");
    assert_eq!(restored.len(), 2);
}

#[test]
fn legacy_spreadsheet_backup_is_read_through_ingestion() {
    let dir = tempdir().expect("tempdir");
    let legacy = dir.path().join("lop12a1_backup_20230101_080000_2hs.csv");
    fs::write(&legacy, "Họ và tên,Mã đề,Điểm\nAn,701,9\nBình,,\n").unwrap();

    let restored = BackupCodec::default()
        .import(&legacy, None, None)
        .expect("legacy import");
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.record(0).unwrap().score(), Some(9.0));
    assert_eq!(restored.record(1).unwrap().exam_code(), "");
}
