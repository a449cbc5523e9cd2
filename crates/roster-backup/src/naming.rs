use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::metadata::BACKUP_DIR_NAME;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const ENCRYPTED_EXTENSION: &str = "enc";
pub const PLAIN_EXTENSION: &str = "json";

/// `<roster dir>/Backup`.
pub fn default_backup_dir(roster_path: &Path) -> PathBuf {
    roster_fs::parent_dir_or_dot(roster_path).join(BACKUP_DIR_NAME)
}

/// File name for a new backup payload.
///
/// Manual backups: `{stem}_backup_{YYYYmmdd_HHMMSS}_{n}hs.{ext}`.
/// Automatic backups: `{stem}_auto_backup_{YYYYmmdd_HHMMSS}.{ext}`.
pub fn backup_file_name(
    roster_path: &Path,
    timestamp: NaiveDateTime,
    total_students: usize,
    encrypted: bool,
    auto_backup: bool,
) -> String {
    let stem = roster_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "roster".to_string());
    let ts = timestamp.format(TIMESTAMP_FORMAT);
    let ext = if encrypted {
        ENCRYPTED_EXTENSION
    } else {
        PLAIN_EXTENSION
    };

    if auto_backup {
        format!("{stem}_auto_backup_{ts}.{ext}")
    } else {
        format!("{stem}_backup_{ts}_{total_students}hs.{ext}")
    }
}
