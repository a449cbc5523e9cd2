//! The `<payload stem>_info.json` record written beside every backup payload.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::kdf::SecurityLevel;

pub const SIDECAR_SUFFIX: &str = "_info.json";

/// Name of the directory backups are written to, next to the roster file.
pub const BACKUP_DIR_NAME: &str = "Backup";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// File name (not path) of the roster the backup was taken from.
    pub original_file: String,
    #[serde(with = "backup_time_format")]
    pub backup_time: NaiveDateTime,
    pub total_students: usize,
    pub scored_students: usize,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,
    /// Base64 (standard alphabet) PBKDF2 salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_level: Option<SecurityLevel>,
    #[serde(default)]
    pub auto_backup: bool,
}

impl BackupRecord {
    /// Where the original roster most likely lives, for restoring when no roster is open.
    ///
    /// Backups are written to `<roster dir>/Backup/`, so the roster is looked up one level
    /// above the payload when the payload sits in a `Backup` directory.
    pub fn original_path_hint(&self, payload_path: &Path) -> PathBuf {
        let dir = roster_fs::parent_dir_or_dot(payload_path);
        let roster_dir = if dir.file_name().is_some_and(|name| name == BACKUP_DIR_NAME) {
            roster_fs::parent_dir_or_dot(dir)
        } else {
            dir
        };
        roster_dir.join(&self.original_file)
    }
}

/// `lop12_backup_20240501_101500_35hs.enc` → `lop12_backup_20240501_101500_35hs_info.json`.
pub fn sidecar_path(payload_path: &Path) -> PathBuf {
    let stem = payload_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    roster_fs::parent_dir_or_dot(payload_path).join(format!("{stem}{SIDECAR_SUFFIX}"))
}

mod backup_time_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        time: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
