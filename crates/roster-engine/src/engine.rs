use std::path::{Path, PathBuf};

use chrono::Local;
use roster_backup::{backup_file_name, default_backup_dir, BackupCodec, BackupError, ExportOptions};
use roster_model::{
    EmptyHistory, IngestionPipeline, LoadProgress, Record, RecordView, RosterStats,
    SearchIndex, SearchResult, SemanticField, Snapshot, Table, UndoStack, ValidationError,
    MAX_SCORE, MIN_SCORE,
};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::background::{self, BackupJob, BackupOutcome};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::input::{ExamCodeInput, ScoreInput};
use crate::persist;

/// Lifecycle of the roster held by a [`RosterDataEngine`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing loaded.
    #[default]
    Empty,
    /// Loaded and unchanged since.
    Loaded,
    /// Edited since the last load or save.
    Dirty,
    /// Saved to the source file since the last edit.
    Persisted,
}

impl EngineState {
    pub fn has_unsaved_changes(self) -> bool {
        self == EngineState::Dirty
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored,
    NothingToUndo,
}

/// What a load or restore produced.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadReport {
    pub rows: usize,
    /// Source row holding the header, when the table came from a spreadsheet.
    pub header_row: Option<usize>,
    /// Semantic fields the source did not contain; their columns were synthesized empty.
    pub missing: Vec<SemanticField>,
    /// Set whenever `missing` is non-empty.
    pub issue: Option<ValidationError>,
}

impl LoadReport {
    fn for_table(table: &Table) -> Self {
        let missing = table.column_map().missing();
        let issue = (!missing.is_empty()).then(|| ValidationError::MissingColumns {
            missing: missing
                .iter()
                .map(|&field| {
                    let label = table.column_map().label(field);
                    label.unwrap_or(field.as_str()).to_string()
                })
                .collect(),
            rows: table.len(),
        });
        Self {
            rows: table.len(),
            header_row: table.source_header_row(),
            missing,
            issue,
        }
    }
}

/// The roster façade: owns the table and every stateful concern around it.
///
/// Each edit validates its input, snapshots the table for undo, applies the change and
/// invalidates the search index. Failed validation leaves both the table and the undo
/// history untouched. With `persist_on_edit`, an edit that cannot be written back is rolled
/// back before the error is returned.
pub struct RosterDataEngine {
    config: EngineConfig,
    pipeline: IngestionPipeline,
    codec: BackupCodec,
    table: Option<Table>,
    source_path: Option<PathBuf>,
    undo: UndoStack,
    index: SearchIndex,
    state: EngineState,
    backup_password: Option<Zeroizing<String>>,
}

impl RosterDataEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = IngestionPipeline::new(config.resolver(), config.load_options());
        Ok(Self {
            codec: BackupCodec::new(pipeline.clone()),
            pipeline,
            config,
            table: None,
            source_path: None,
            undo: UndoStack::new(),
            index: SearchIndex::new(),
            state: EngineState::Empty,
            backup_password: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn record(&self, row: usize) -> Result<RecordView<'_>> {
        let table = self.loaded()?;
        table.record(row).ok_or_else(|| {
            ValidationError::RowOutOfRange {
                row,
                len: table.len(),
            }
            .into()
        })
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        let table = self.pipeline.load(path)?;
        Ok(self.install(table, path.to_path_buf()))
    }

    pub fn load_with_progress(
        &mut self,
        path: impl AsRef<Path>,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<LoadReport> {
        let path = path.as_ref();
        let table = self.pipeline.load_with_progress(path, progress)?;
        Ok(self.install(table, path.to_path_buf()))
    }

    /// Load on the blocking pool. The engine is only touched once the table is ready.
    pub async fn load_async(&mut self, path: impl Into<PathBuf>) -> Result<LoadReport> {
        let path = path.into();
        let table = background::load_in_background(self.pipeline.clone(), path.clone()).await??;
        Ok(self.install(table, path))
    }

    /// Replace the current roster with `table`, read from `path`. Clears undo history.
    pub fn install(&mut self, table: Table, path: PathBuf) -> LoadReport {
        let report = LoadReport::for_table(&table);
        if let Some(issue) = &report.issue {
            log::warn!("{}: {issue}", path.display());
        }
        log::info!("loaded {} students from {}", report.rows, path.display());

        self.table = Some(table);
        self.source_path = Some(path);
        self.undo.clear();
        self.index.invalidate();
        self.state = EngineState::Loaded;
        report
    }

    /// Append a student with no exam code and no score. Returns the new row.
    pub fn add_record(&mut self, name: &str) -> Result<usize> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let table = self.table.as_mut().ok_or(EngineError::NoTable)?;
        if table.find_name(name).is_some() {
            return Err(ValidationError::DuplicateName(name.to_string()).into());
        }

        self.undo.push(table);
        let row = table.push_record(Record::new(name));
        log::debug!("added student {name:?} at row {row}");
        self.commit_edit(Rollback::PopSnapshot)?;
        Ok(row)
    }

    pub fn delete_record(&mut self, row: usize) -> Result<()> {
        let table = self.table.as_mut().ok_or(EngineError::NoTable)?;
        table.check_row(row)?;
        self.undo.push(table);
        table.remove_row(row)?;
        self.commit_edit(Rollback::PopSnapshot)
    }

    pub fn set_score(&mut self, row: usize, score: f64) -> Result<()> {
        self.grade(row, ScoreInput::Direct(score), ExamCodeInput::Keep)
    }

    pub fn set_score_from_correct_count(&mut self, row: usize, correct: u32) -> Result<()> {
        self.grade(row, ScoreInput::CorrectCount(correct), ExamCodeInput::Keep)
    }

    pub fn clear_score(&mut self, row: usize) -> Result<()> {
        self.grade(row, ScoreInput::Clear, ExamCodeInput::Keep)
    }

    /// Set the exam code from typed text. Blank or `x` clears it.
    pub fn set_exam_code(&mut self, row: usize, code: &str) -> Result<()> {
        let input = match ExamCodeInput::parse(code)? {
            ExamCodeInput::Keep => ExamCodeInput::Clear,
            input => input,
        };
        self.grade(row, ScoreInput::Keep, input)
    }

    /// Apply a score and an exam code change to `row` as a single undo step.
    ///
    /// Both inputs are validated before anything changes. When both are `Keep` nothing is
    /// recorded.
    pub fn grade(&mut self, row: usize, score: ScoreInput, exam_code: ExamCodeInput) -> Result<()> {
        let score = match score {
            ScoreInput::Keep => None,
            ScoreInput::Clear => Some(None),
            ScoreInput::Direct(value) => Some(Some(check_score(value)?)),
            ScoreInput::CorrectCount(correct) => {
                Some(Some(self.config.scoring.score_for(correct)?))
            }
        };

        let table = self.table.as_mut().ok_or(EngineError::NoTable)?;
        table.check_row(row)?;
        if score.is_none() && exam_code == ExamCodeInput::Keep {
            return Ok(());
        }

        self.undo.push(table);
        if let Some(score) = score {
            table.set_score(row, score)?;
        }
        match exam_code {
            ExamCodeInput::Keep => {}
            ExamCodeInput::Clear => table.set_exam_code(row, "")?,
            ExamCodeInput::Set(code) => table.set_exam_code(row, &code)?,
        }
        self.commit_edit(Rollback::PopSnapshot)
    }

    pub fn undo(&mut self) -> Result<UndoOutcome> {
        match self.undo.undo() {
            Ok(snapshot) => {
                let replaced = self.table.replace(snapshot.into_table());
                log::debug!("undo: {} steps left", self.undo.len());
                self.commit_edit(Rollback::Reinstate(replaced))?;
                Ok(UndoOutcome::Restored)
            }
            Err(EmptyHistory) => Ok(UndoOutcome::NothingToUndo),
        }
    }

    /// Write the roster back to the file it was loaded from.
    pub fn persist(&mut self) -> Result<PathBuf> {
        let table = self.table.as_ref().ok_or(EngineError::NoTable)?;
        let path = self.source_path.clone().ok_or(EngineError::NoPersistTarget)?;
        persist::write_table(table, &path)?;
        self.state = EngineState::Persisted;
        Ok(path)
    }

    /// Write the roster to `path`, which becomes the new persist target.
    pub fn persist_to(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let table = self.table.as_ref().ok_or(EngineError::NoTable)?;
        persist::write_table(table, &path)?;
        self.source_path = Some(path);
        self.state = EngineState::Persisted;
        Ok(())
    }

    pub fn search(&mut self, query: &str) -> SearchResult {
        match self.table.as_ref() {
            Some(table) => self.index.search(table, query),
            None => SearchResult::default(),
        }
    }

    pub fn stats(&self) -> RosterStats {
        self.table.as_ref().map(RosterStats::compute).unwrap_or_default()
    }

    /// Remember a password for backups that do not supply one. `None` or an empty string
    /// forgets it.
    pub fn set_backup_password(&mut self, password: Option<&str>) {
        self.backup_password = password
            .filter(|p| !p.is_empty())
            .map(|p| Zeroizing::new(p.to_string()));
    }

    pub fn has_backup_password(&self) -> bool {
        self.backup_password.is_some()
    }

    /// Capture a backup of the current roster, to be written into `Backup/` next to the
    /// source file.
    ///
    /// An explicit `password` always encrypts. Otherwise the stored password is used when
    /// `security.encrypt_backups` is on; with no stored password the backup is written in
    /// plain text and a warning is logged.
    pub fn backup_job(&self, password: Option<&str>, auto_backup: bool) -> Result<BackupJob> {
        let table = self.loaded()?;
        let source = self
            .source_path
            .as_deref()
            .ok_or(EngineError::NoPersistTarget)?;

        let password = match password {
            Some(password) if password.is_empty() => return Err(BackupError::EmptyPassword.into()),
            Some(password) => Some(Zeroizing::new(password.to_string())),
            None if self.config.security.encrypt_backups => match &self.backup_password {
                Some(stored) => Some(stored.clone()),
                None => {
                    log::warn!(
                        "backup encryption is enabled but no password is set; \
                         writing a plain backup"
                    );
                    None
                }
            },
            None => None,
        };

        let now = Local::now().naive_local();
        let name = backup_file_name(source, now, table.len(), password.is_some(), auto_backup);
        let dest = default_backup_dir(source).join(name);
        let options = ExportOptions {
            password,
            security_level: self.config.security.backup_encryption_level,
            original_file: source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            app_version: self.config.app_version.clone(),
            auto_backup,
            backup_time: Some(now),
        };
        Ok(BackupJob::new(table.clone(), dest, options, self.codec.clone()))
    }

    pub fn backup(&self, password: Option<&str>) -> Result<BackupOutcome> {
        Ok(self.backup_job(password, false)?.run()?)
    }

    /// Export on the blocking pool from a snapshot taken now.
    pub fn backup_in_background(
        &self,
        password: Option<&str>,
    ) -> Result<JoinHandle<std::result::Result<BackupOutcome, BackupError>>> {
        Ok(background::export_in_background(self.backup_job(password, false)?))
    }

    /// Write an automatic backup if `auto_backup` is enabled and a roster with a source
    /// file is loaded.
    pub fn auto_backup(&self) -> Result<Option<BackupOutcome>> {
        if !self.config.auto_backup || self.table.is_none() || self.source_path.is_none() {
            return Ok(None);
        }
        Ok(Some(self.backup_job(None, true)?.run()?))
    }

    /// Replace the roster with the contents of a backup. The previous roster can be
    /// restored with [`RosterDataEngine::undo`].
    pub fn restore_backup(
        &mut self,
        payload: &Path,
        metadata: Option<&Path>,
        password: Option<&str>,
    ) -> Result<LoadReport> {
        let restored = self.codec.import(payload, metadata, password)?;
        let previous_source = self.source_path.clone();
        if self.source_path.is_none() {
            if let Ok(Some(record)) = self.codec.read_metadata(payload, metadata) {
                self.source_path = Some(record.original_path_hint(payload));
            }
        }

        let report = LoadReport::for_table(&restored);
        let rollback = match self.table.as_ref() {
            Some(current) => {
                self.undo.push(current);
                Rollback::PopSnapshot
            }
            None => Rollback::Discard,
        };
        self.table = Some(restored);
        if let Err(err) = self.commit_edit(rollback) {
            self.source_path = previous_source;
            return Err(err);
        }
        Ok(report)
    }

    /// Drop the roster, writing an automatic backup first when enabled. A failed backup is
    /// logged and does not keep the roster open.
    pub fn close(&mut self) -> Option<BackupOutcome> {
        let outcome = match self.auto_backup() {
            Ok(outcome) => outcome,
            Err(err) => {
                log::warn!("automatic backup failed: {err}");
                None
            }
        };
        self.table = None;
        self.source_path = None;
        self.undo.clear();
        self.index.invalidate();
        self.state = EngineState::Empty;
        outcome
    }

    fn loaded(&self) -> Result<&Table> {
        self.table.as_ref().ok_or(EngineError::NoTable)
    }

    /// Mark an applied edit dirty and, with `persist_on_edit`, write it through. A failed
    /// write puts the previous table back as described by `rollback`.
    fn commit_edit(&mut self, rollback: Rollback) -> Result<()> {
        let previous_state = self.state;
        self.index.invalidate();
        self.state = EngineState::Dirty;
        if !self.config.persist_on_edit || self.source_path.is_none() {
            return Ok(());
        }

        let Err(err) = self.persist() else {
            return Ok(());
        };
        match rollback {
            Rollback::PopSnapshot => {
                self.table = self.undo.undo().ok().map(Snapshot::into_table);
            }
            Rollback::Reinstate(replaced) => {
                if let Some(current) = self.table.take() {
                    self.undo.push(&current);
                }
                self.table = replaced;
            }
            Rollback::Discard => self.table = None,
        }
        self.state = previous_state;
        log::warn!("edit was not saved and has been rolled back: {err}");
        Err(err)
    }
}

/// How `commit_edit` restores the pre-edit table.
enum Rollback {
    /// The pre-edit table is the newest undo snapshot.
    PopSnapshot,
    /// An undo replaced this table; the undone snapshot goes back on the stack.
    Reinstate(Option<Table>),
    /// There was no table before the edit.
    Discard,
}

fn check_score(score: f64) -> std::result::Result<f64, ValidationError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(ValidationError::ScoreOutOfRange(score))
    }
}
