//! Bounded undo/redo history of board states.

use crate::objects::ObjectSpec;
use std::collections::VecDeque;

/// Maximum number of history entries to keep.
pub const HISTORY_CAPACITY: usize = 50;

/// Ordered sequence of object-list snapshots with a cursor.
///
/// The cursor is `None` while the store is empty and otherwise always points
/// at a valid entry. Pushing appends after the newest entry and moves the
/// cursor there; once full, the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: VecDeque<Vec<ObjectSpec>>,
    cursor: Option<usize>,
    capacity: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create a store with a custom capacity (at least one entry).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            cursor: None,
            capacity,
        }
    }

    /// Record a snapshot of the full object list.
    pub fn push(&mut self, snapshot: Vec<ObjectSpec>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Step back one entry. Returns the state to load, or `None` when
    /// already at the oldest entry.
    pub fn undo(&mut self) -> Option<&[ObjectSpec]> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1).map(Vec::as_slice)
    }

    /// Step forward one entry. Returns the state to load, or `None` when
    /// already at the newest entry.
    pub fn redo(&mut self) -> Option<&[ObjectSpec]> {
        let cursor = self.cursor?;
        if cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor + 1);
        self.entries.get(cursor + 1).map(Vec::as_slice)
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    /// The entry the cursor points at.
    pub fn current(&self) -> Option<&[ObjectSpec]> {
        self.cursor
            .and_then(|c| self.entries.get(c))
            .map(Vec::as_slice)
    }

    pub fn get(&self, index: usize) -> Option<&[ObjectSpec]> {
        self.entries.get(index).map(Vec::as_slice)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
