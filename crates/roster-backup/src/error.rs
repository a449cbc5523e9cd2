use std::path::PathBuf;

use roster_model::IngestionError;
use thiserror::Error;

use crate::encryption::EncryptionError;

/// A backup could not be written.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup password cannot be empty")]
    EmptyPassword,
    #[error("failed to serialize backup: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to encrypt backup: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A backup could not be restored. The live roster is never modified when this is returned.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// Wrong password or a tampered payload.
    #[error("backup could not be decrypted: wrong password or corrupted file")]
    AuthenticationFailed,
    #[error("encrypted backup has no salt; its metadata file is missing or incomplete")]
    MissingSalt,
    #[error("backup is encrypted; a password is required")]
    PasswordRequired,
    #[error("unsupported backup encryption method {0:?}")]
    UnsupportedMethod(String),
    #[error("backup payload is corrupt: {0}")]
    CorruptPayload(String),
    #[error("invalid backup metadata {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}
