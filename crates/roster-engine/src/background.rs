//! Off-thread loading and backup export.
//!
//! Both run on tokio's blocking pool: reading a workbook and deriving a PBKDF2 key are CPU
//! and disk bound. A [`BackupJob`] owns a snapshot of the roster, so edits made while the
//! export runs never leak into the file being written.

use std::path::{Path, PathBuf};

use roster_backup::{sidecar_path, BackupCodec, BackupError, BackupRecord, ExportOptions};
use roster_model::{IngestionError, IngestionPipeline, Table};
use tokio::task::JoinHandle;

/// Where a finished backup was written and what its sidecar says.
#[derive(Clone, Debug, PartialEq)]
pub struct BackupOutcome {
    pub payload_path: PathBuf,
    pub metadata_path: PathBuf,
    pub record: BackupRecord,
}

/// A backup export captured at a point in time.
#[derive(Debug)]
pub struct BackupJob {
    table: Table,
    dest: PathBuf,
    options: ExportOptions,
    codec: BackupCodec,
}

impl BackupJob {
    pub fn new(table: Table, dest: PathBuf, options: ExportOptions, codec: BackupCodec) -> Self {
        Self {
            table,
            dest,
            options,
            codec,
        }
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn is_encrypted(&self) -> bool {
        self.options.password.is_some()
    }

    pub fn run(self) -> Result<BackupOutcome, BackupError> {
        let record = self.codec.export(&self.table, &self.dest, &self.options)?;
        Ok(BackupOutcome {
            metadata_path: sidecar_path(&self.dest),
            payload_path: self.dest,
            record,
        })
    }
}

/// Load `path` on the blocking pool.
pub fn load_in_background(
    pipeline: IngestionPipeline,
    path: PathBuf,
) -> JoinHandle<Result<Table, IngestionError>> {
    tokio::task::spawn_blocking(move || pipeline.load(&path))
}

/// Run `job` on the blocking pool.
pub fn export_in_background(job: BackupJob) -> JoinHandle<Result<BackupOutcome, BackupError>> {
    tokio::task::spawn_blocking(move || job.run())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send + 'static>() {}

    #[test]
    fn jobs_can_cross_threads() {
        assert_send::<BackupJob>();
        assert_send::<BackupOutcome>();
        assert_send::<IngestionPipeline>();
    }
}
