//! Bounded undo/redo over the record collection.
//!
//! Callers push a snapshot immediately before every destructive per-face or
//! per-image mutation; the manager does not infer which operations mutate.
//! Snapshots are deep copies of the record collection plus the active image
//! and face indices. Decoded pixel handles are `Arc`-shared, so a snapshot
//! never duplicates pixel buffers.

use std::collections::VecDeque;

use crate::error::HistoryError;
use crate::records::ImageRecord;

/// Maximum number of undo entries retained; the oldest entry is evicted
/// beyond this.
pub const HISTORY_CAPACITY: usize = 50;

/// A restorable point-in-time copy of the workspace.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<ImageRecord>,
    pub active_image: Option<usize>,
    pub active_face: Option<usize>,
}

impl Snapshot {
    pub fn new(
        records: Vec<ImageRecord>,
        active_image: Option<usize>,
        active_face: Option<usize>,
    ) -> Self {
        Self {
            records,
            active_image,
            active_face,
        }
    }
}

/// Undo/redo stacks with a bounded undo depth.
#[derive(Default)]
pub struct EditHistory {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pre-mutation state. Clears the redo stack: a fresh
    /// mutation invalidates any redoable future.
    pub fn snapshot(&mut self, state: Snapshot) {
        self.redo.clear();
        self.undo.push_back(state);
        while self.undo.len() > HISTORY_CAPACITY {
            self.undo.pop_front();
        }
    }

    /// Pop the most recent snapshot, pushing the live state onto the redo
    /// stack. The caller restores the returned snapshot.
    pub fn undo(&mut self, live: Snapshot) -> Result<Snapshot, HistoryError> {
        let restored = self.undo.pop_back().ok_or(HistoryError::Empty)?;
        self.redo.push(live);
        Ok(restored)
    }

    /// Symmetric to [`EditHistory::undo`].
    pub fn redo(&mut self, live: Snapshot) -> Result<Snapshot, HistoryError> {
        let restored = self.redo.pop().ok_or(HistoryError::Empty)?;
        self.undo.push_back(live);
        Ok(restored)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Peek at the oldest retained snapshot (used by tests and diagnostics).
    pub fn oldest(&self) -> Option<&Snapshot> {
        self.undo.front()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
