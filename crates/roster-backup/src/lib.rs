//! Roster backups: a JSON payload (optionally AES-256-GCM encrypted under a PBKDF2 key) plus a
//! human-readable `_info.json` metadata sidecar.
//!
//! ```text
//! <roster dir>/Backup/lop12_backup_20240501_101500_35hs.enc
//! <roster dir>/Backup/lop12_backup_20240501_101500_35hs_info.json
//! ```
//!
//! Backups from the earlier Fernet scheme (`fernet_pbkdf2`) can still be restored.

mod codec;
pub mod encryption;
mod error;
pub mod kdf;
mod legacy;
mod metadata;
mod naming;

pub use codec::{BackupCodec, ExportOptions};
pub use encryption::{is_encrypted_container, ENCRYPTION_METHOD};
pub use error::{BackupError, RestoreError};
pub use kdf::SecurityLevel;
pub use legacy::LEGACY_METHOD;
pub use metadata::{sidecar_path, BackupRecord, BACKUP_DIR_NAME, SIDECAR_SUFFIX};
pub use naming::{backup_file_name, default_backup_dir, ENCRYPTED_EXTENSION, PLAIN_EXTENSION};
