//! `roster-engine` is the stateful side of the roster: it owns the loaded table and wires
//! ingestion, validated edits, undo, search, persistence and backups together behind
//! [`RosterDataEngine`].
//!
//! Presentation layers drive the engine and render what it returns; nothing in here
//! assumes a particular UI.

mod background;
pub mod config;
mod engine;
mod error;
mod input;
pub mod persist;

pub use background::{export_in_background, load_in_background, BackupJob, BackupOutcome};
pub use config::{
    ConfigError, EngineConfig, IngestionConfig, ScoringConfig, SecurityConfig, CONFIG_FILE_NAME,
};
pub use engine::{EngineState, LoadReport, RosterDataEngine, UndoOutcome};
pub use error::{EngineError, Result};
pub use input::{ExamCodeInput, ScoreInput};
pub use persist::PersistError;

pub use roster_backup::{RestoreError, SecurityLevel};
pub use roster_model::{RosterStats, SearchResult, Table, ValidationError};
