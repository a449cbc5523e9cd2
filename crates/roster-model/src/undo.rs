use std::collections::VecDeque;

use thiserror::Error;

use crate::table::Table;

/// Number of snapshots kept before the oldest is evicted.
pub const UNDO_CAPACITY: usize = 10;

/// Immutable deep copy of a [`Table`] taken before a mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    table: Table,
}

impl Snapshot {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("nothing to undo")]
pub struct EmptyHistory;

/// Bounded LIFO of table snapshots.
#[derive(Clone, Debug)]
pub struct UndoStack {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::with_capacity(UNDO_CAPACITY)
    }
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the current state of `table`, evicting the oldest snapshot when full.
    pub fn push(&mut self, table: &Table) {
        if self.capacity == 0 {
            return;
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(Snapshot {
            table: table.clone(),
        });
    }

    pub fn undo(&mut self) -> Result<Snapshot, EmptyHistory> {
        self.snapshots.pop_back().ok_or(EmptyHistory)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
