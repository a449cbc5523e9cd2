//! Case-insensitive substring search over the name column.

use crate::error::ValidationError;
use crate::table::Table;
use crate::text::fold;

/// Rows shown for an empty query.
pub const DISPLAY_LIMIT: usize = 100;
/// Maximum rows returned for a non-empty query.
pub const RESULT_LIMIT: usize = 200;

/// The result set was cut short: `shown` of `total` rows are included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Truncation {
    pub shown: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// The query after trimming and folding.
    pub query: String,
    /// Matching row indices, in table order.
    pub rows: Vec<usize>,
    /// Number of rows that matched before the limit was applied.
    pub total_matches: usize,
    pub truncated: Option<Truncation>,
    /// Set to the single matching row when a non-empty query matched exactly one row.
    pub auto_select: Option<usize>,
}

impl SearchResult {
    /// The auto-selected row, for edits that act on "the" student of the current search.
    pub fn selected(&self) -> Result<usize, ValidationError> {
        self.auto_select.ok_or(ValidationError::NoSelection)
    }
}

/// Folded student names, parallel to the table's row order.
///
/// The cache is considered stale whenever its length differs from the table's. Edits that
/// keep the row count but rename students must call [`SearchIndex::invalidate`].
#[derive(Clone, Debug, Default)]
pub struct SearchIndex {
    names: Option<Vec<String>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.names = None;
    }

    pub fn is_fresh(&self, table: &Table) -> bool {
        self.names
            .as_ref()
            .is_some_and(|names| names.len() == table.len())
    }

    /// Rebuild the cache iff it is missing or its length differs from the table's.
    pub fn ensure_fresh(&mut self, table: &Table) {
        if self.is_fresh(table) {
            return;
        }
        self.names = Some(table.records().map(|r| fold(r.name().trim())).collect());
        log::debug!("rebuilt search index over {} rows", table.len());
    }

    pub fn search(&mut self, table: &Table, query: &str) -> SearchResult {
        self.ensure_fresh(table);
        let names = self.names.as_deref().unwrap_or_default();
        let query = fold(query.trim());

        if query.is_empty() {
            let total = names.len();
            let shown = total.min(DISPLAY_LIMIT);
            return SearchResult {
                query,
                rows: (0..shown).collect(),
                total_matches: total,
                truncated: (total > DISPLAY_LIMIT).then_some(Truncation { shown, total }),
                auto_select: None,
            };
        }

        let mut rows = Vec::new();
        let mut total = 0usize;
        for (row, name) in names.iter().enumerate() {
            if name.contains(query.as_str()) {
                total += 1;
                if rows.len() < RESULT_LIMIT {
                    rows.push(row);
                }
            }
        }

        SearchResult {
            auto_select: (total == 1).then(|| rows[0]),
            truncated: (total > RESULT_LIMIT).then_some(Truncation {
                shown: rows.len(),
                total,
            }),
            total_matches: total,
            rows,
            query,
        }
    }
}
