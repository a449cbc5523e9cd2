//! `roster-model` defines the in-memory student roster and the operations that keep it
//! well-typed.
//!
//! The crate has no persistence concerns. It is shared by:
//! - the roster engine façade (edits, undo, persistence)
//! - the backup codec (restored tables funnel back through the same normalizer)
//!
//! A [`Table`] holds heterogeneous spreadsheet cells. Three *semantic* columns (student
//! name, exam code, score) are located with a [`ColumnResolver`] and kept in canonical form
//! by [`normalize`]; every other column is passed through verbatim.

pub mod columns;
mod error;
pub mod import;
pub mod normalize;
pub mod search;
mod stats;
mod table;
mod text;
mod undo;
mod value;

pub use columns::{
    CanonicalColumns, ColumnAliases, ColumnMap, ColumnMatch, ColumnResolver, MatchKind,
    SemanticField,
};
pub use error::{IngestionError, ValidationError};
pub use import::{
    detect_header_row, IngestionPipeline, LoadOptions, LoadProgress, SourceFormat, TextEncoding,
};
pub use normalize::{normalize, normalize_in_place};
pub use search::{SearchIndex, SearchResult, Truncation, DISPLAY_LIMIT, RESULT_LIMIT};
pub use stats::{RosterStats, ScoreExtreme};
pub use table::{Record, RecordView, Table};
pub use text::fold;
pub use undo::{EmptyHistory, Snapshot, UndoStack, UNDO_CAPACITY};
pub use value::CellValue;

/// Lowest score a student can be given.
pub const MIN_SCORE: f64 = 0.0;
/// Highest score a student can be given.
pub const MAX_SCORE: f64 = 10.0;
