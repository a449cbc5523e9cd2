use roster_backup::{BackupError, RestoreError};
use roster_model::{IngestionError, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::persist::PersistError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no roster is loaded")]
    NoTable,
    #[error("the roster has no file to save to")]
    NoPersistTarget,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
