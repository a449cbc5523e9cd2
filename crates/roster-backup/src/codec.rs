use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Local, NaiveDateTime};
use roster_model::{CellValue, IngestionPipeline, SourceFormat, Table};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encryption::{self, EncryptionError, ENCRYPTION_METHOD};
use crate::error::{BackupError, RestoreError};
use crate::kdf::{derive_key, SecurityLevel};
use crate::legacy::{self, LEGACY_METHOD};
use crate::metadata::{sidecar_path, BackupRecord};
use crate::naming::ENCRYPTED_EXTENSION;

/// Transport form of a table: every column, row-major, cells keep their type.
#[derive(Serialize)]
struct PayloadRef<'a> {
    columns: &'a [String],
    rows: &'a [Vec<CellValue>],
}

#[derive(Deserialize)]
struct Payload {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

/// How a decrypted payload lays out the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PayloadShape {
    /// [`Payload`]: a column list plus row-major cells.
    Columns,
    /// A JSON array of `{label: value}` objects, from Fernet backups.
    Records,
}

#[derive(Clone, Default)]
pub struct ExportOptions {
    /// Encrypt the payload with a key derived from this password.
    pub password: Option<Zeroizing<String>>,
    pub security_level: SecurityLevel,
    /// File name of the roster being backed up.
    pub original_file: String,
    pub app_version: String,
    pub auto_backup: bool,
    /// Defaults to the current local time.
    pub backup_time: Option<NaiveDateTime>,
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("security_level", &self.security_level)
            .field("original_file", &self.original_file)
            .field("app_version", &self.app_version)
            .field("auto_backup", &self.auto_backup)
            .field("backup_time", &self.backup_time)
            .finish()
    }
}

/// Writes and reads backup payloads together with their metadata sidecar.
#[derive(Clone, Debug, Default)]
pub struct BackupCodec {
    pipeline: IngestionPipeline,
}

impl BackupCodec {
    /// `pipeline` reads legacy spreadsheet backups and supplies the column resolver used to
    /// re-resolve restored tables.
    pub fn new(pipeline: IngestionPipeline) -> Self {
        Self { pipeline }
    }

    /// Write `table` to `dest` and its metadata to the sidecar next to it.
    pub fn export(
        &self,
        table: &Table,
        dest: &Path,
        options: &ExportOptions,
    ) -> Result<BackupRecord, BackupError> {
        let plaintext = Zeroizing::new(serde_json::to_vec_pretty(&PayloadRef {
            columns: table.columns(),
            rows: table.rows(),
        })?);

        let mut record = BackupRecord {
            original_file: options.original_file.clone(),
            backup_time: options
                .backup_time
                .unwrap_or_else(|| Local::now().naive_local()),
            total_students: table.len(),
            scored_students: table.scored_count(),
            app_version: options.app_version.clone(),
            encrypted: false,
            encryption_method: None,
            salt: None,
            iterations: None,
            encryption_level: None,
            auto_backup: options.auto_backup,
        };

        let payload = match options.password.as_deref() {
            None => plaintext.to_vec(),
            Some(password) if password.is_empty() => return Err(BackupError::EmptyPassword),
            Some(password) => {
                let level = options.security_level;
                let iterations = level.iterations();
                let salt = encryption::random_salt();
                let key = derive_key(password, &salt, iterations)?;
                let sealed = encryption::seal(&plaintext, &key)?;

                record.encrypted = true;
                record.encryption_method = Some(ENCRYPTION_METHOD.to_string());
                record.salt = Some(STANDARD.encode(salt));
                record.iterations = Some(iterations);
                record.encryption_level = Some(level);
                sealed
            }
        };

        let sidecar = sidecar_path(dest);
        let metadata = serde_json::to_vec_pretty(&record)?;
        roster_fs::atomic_write_bytes(dest, &payload).map_err(|source| BackupError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        roster_fs::atomic_write_bytes(&sidecar, &metadata).map_err(|source| BackupError::Io {
            path: sidecar.clone(),
            source,
        })?;

        log::info!(
            "wrote {} backup of {} students to {}",
            if record.encrypted { "encrypted" } else { "plain" },
            record.total_students,
            dest.display()
        );
        Ok(record)
    }

    /// Read a backup back into a normalized table.
    ///
    /// `metadata_path` defaults to the sidecar next to the payload. A payload without any
    /// metadata is treated as a legacy backup.
    pub fn import(
        &self,
        payload_path: &Path,
        metadata_path: Option<&Path>,
        password: Option<&str>,
    ) -> Result<Table, RestoreError> {
        let metadata = self.read_metadata(payload_path, metadata_path)?;
        let encrypted = metadata.as_ref().is_some_and(|m| m.encrypted);

        if !encrypted && SourceFormat::from_path(payload_path).is_ok() {
            log::info!("restoring spreadsheet backup {}", payload_path.display());
            return Ok(self.pipeline.load(payload_path)?);
        }

        let bytes = fs::read(payload_path).map_err(|source| RestoreError::Io {
            path: payload_path.to_path_buf(),
            source,
        })?;

        let (plaintext, shape) = match metadata.as_ref() {
            Some(record) if record.encrypted => decrypt(&bytes, record, password)?,
            _ if encryption::is_encrypted_container(&bytes)
                || has_encrypted_extension(payload_path) =>
            {
                return Err(RestoreError::MissingSalt);
            }
            _ => (Zeroizing::new(bytes), PayloadShape::Columns),
        };

        let (columns, rows) = match shape {
            PayloadShape::Columns => serde_json::from_slice::<Payload>(&plaintext)
                .map(|payload| (payload.columns, payload.rows)),
            PayloadShape::Records => legacy::records_to_rows(&plaintext),
        }
        .map_err(|err| RestoreError::CorruptPayload(err.to_string()))?;
        let table = Table::from_rows(columns, rows, self.pipeline.resolver());

        log::info!(
            "restored {} students from {}",
            table.len(),
            payload_path.display()
        );
        Ok(table)
    }

    /// Load the metadata for `payload_path`, from `explicit` or the default sidecar.
    ///
    /// Returns `Ok(None)` when no explicit path is given and no sidecar exists.
    pub fn read_metadata(
        &self,
        payload_path: &Path,
        explicit: Option<&Path>,
    ) -> Result<Option<BackupRecord>, RestoreError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = sidecar_path(payload_path);
                if !path.is_file() {
                    log::debug!("no metadata for {}; treating as legacy", payload_path.display());
                    return Ok(None);
                }
                path
            }
        };

        let raw = fs::read(&path).map_err(|source| RestoreError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| RestoreError::Metadata { path, source })
    }
}

fn decrypt(
    bytes: &[u8],
    record: &BackupRecord,
    password: Option<&str>,
) -> Result<(Zeroizing<Vec<u8>>, PayloadShape), RestoreError> {
    let shape = match record.encryption_method.as_deref() {
        None | Some(ENCRYPTION_METHOD) => PayloadShape::Columns,
        Some(LEGACY_METHOD) => PayloadShape::Records,
        Some(method) => return Err(RestoreError::UnsupportedMethod(method.to_string())),
    };

    let password = password
        .filter(|p| !p.is_empty())
        .ok_or(RestoreError::PasswordRequired)?;
    let salt = record.salt.as_deref().ok_or(RestoreError::MissingSalt)?;
    let salt = STANDARD
        .decode(salt)
        .map_err(|err| RestoreError::CorruptPayload(format!("invalid salt: {err}")))?;
    let iterations = record
        .iterations
        .or(record.encryption_level.map(SecurityLevel::iterations))
        .unwrap_or_else(|| SecurityLevel::default().iterations());

    let key = derive_key(password, &salt, iterations)
        .map_err(|err| RestoreError::CorruptPayload(err.to_string()))?;
    let opened = match shape {
        PayloadShape::Columns => encryption::open(bytes, &key),
        PayloadShape::Records => legacy::open_token(bytes, &key),
    };
    opened
        .map(|plaintext| (Zeroizing::new(plaintext), shape))
        .map_err(|err| match err {
            EncryptionError::Aead | EncryptionError::TokenSignature => {
                RestoreError::AuthenticationFailed
            }
            other => RestoreError::CorruptPayload(other.to_string()),
        })
}

fn has_encrypted_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ENCRYPTED_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_model::{ColumnResolver, Record};

    fn roster() -> Table {
        let mut table = Table::from_rows(
            vec!["Họ và tên".into(), "Lớp".into()],
            Vec::new(),
            &ColumnResolver::default(),
        );
        table.push_record(Record::new("An").with_score(8.25).with_extra("Lớp", "12A1"));
        table.push_record(Record::new("Bình").with_exam_code("702"));
        table
    }

    #[test]
    fn plain_payload_is_readable_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("lop_backup.json");
        BackupCodec::default()
            .export(&roster(), &dest, &ExportOptions::default())
            .expect("export");

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&dest).unwrap()).expect("payload is json");
        assert_eq!(json["columns"][0], "Họ và tên");
        assert_eq!(json["rows"][0][0], "An");
        assert_eq!(json["rows"][0][1], "12A1");
    }

    #[test]
    fn empty_password_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("x.enc");
        let err = BackupCodec::default()
            .export(
                &roster(),
                &dest,
                &ExportOptions {
                    password: Some(Zeroizing::new(String::new())),
                    ..Default::default()
                },
            )
            .expect_err("empty password");
        assert!(matches!(err, BackupError::EmptyPassword));
        assert!(!dest.exists());
    }

    #[test]
    fn debug_output_redacts_password() {
        let options = ExportOptions {
            password: Some(Zeroizing::new("hunter2".into())),
            ..Default::default()
        };
        let debug = format!("{options:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    fn write_fernet_backup(dir: &Path, method: &str) -> std::path::PathBuf {
        let salt = [9u8; 16];
        let key = derive_key("matkhau", &salt, 1_000).unwrap();
        let records = r#"[{"Họ và tên":"An","Mã đề":701,"Điểm":8.25,"Lớp":"12A1"},
                          {"Họ và tên":"Bình","Mã đề":null,"Điểm":null,"Lớp":"12A1"}]"#;
        let token = legacy::seal_token(records.as_bytes(), &key, [5; 16]);

        let payload = dir.join("lop12_backup_20230101_000000.enc");
        fs::write(&payload, token).unwrap();
        let sidecar = serde_json::json!({
            "original_file": "lop12.xlsx",
            "backup_time": "2023-01-01 00:00:00",
            "total_students": 2,
            "scored_students": 1,
            "encrypted": true,
            "salt": STANDARD.encode(salt),
            "encryption_method": method,
            "iterations": 1_000,
        });
        fs::write(sidecar_path(&payload), sidecar.to_string()).unwrap();
        payload
    }

    #[test]
    fn fernet_backups_restore_with_their_password() {
        let dir = tempfile::tempdir().expect("tempdir");
        let payload = write_fernet_backup(dir.path(), LEGACY_METHOD);
        let codec = BackupCodec::default();

        let table = codec
            .import(&payload, None, Some("matkhau"))
            .expect("fernet backup");
        assert_eq!(table.columns(), &["Họ và tên", "Mã đề", "Điểm", "Lớp"]);
        assert_eq!(table.len(), 2);
        let an = table.record(0).unwrap();
        assert_eq!((an.name(), an.exam_code(), an.score()), ("An", "701", Some(8.25)));
        assert_eq!(table.record(1).unwrap().score(), None);
        assert_eq!(table.rows()[1][3], CellValue::Text("12A1".into()));

        assert!(matches!(
            codec.import(&payload, None, Some("sai")),
            Err(RestoreError::AuthenticationFailed)
        ));
        assert!(matches!(
            codec.import(&payload, None, None),
            Err(RestoreError::PasswordRequired)
        ));
    }

    #[test]
    fn unknown_encryption_method_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let payload = write_fernet_backup(dir.path(), "rot13");
        let err = BackupCodec::default()
            .import(&payload, None, Some("matkhau"))
            .expect_err("unknown method");
        assert!(matches!(err, RestoreError::UnsupportedMethod(m) if m == "rot13"));
    }

    #[test]
    fn garbage_plain_payload_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let payload = dir.path().join("broken.json");
        fs::write(&payload, b"{\"columns\": [").unwrap();
        let err = BackupCodec::default()
            .import(&payload, None, None)
            .expect_err("truncated json");
        assert!(matches!(err, RestoreError::CorruptPayload(_)));
    }
}
