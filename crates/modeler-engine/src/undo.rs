//! Undo/redo history for model editing
//!
//! Each entry is the model's persistent document, compressed with zstd.
//! Restoring an entry goes through the same loader as a file, so a
//! snapshot can never produce a model the loader would reject.

use std::collections::VecDeque;

use crate::document::{from_document, to_document};
use crate::error::{ModelerError, Result};
use crate::model::WorkflowModel;

const COMPRESSION_LEVEL: i32 = 3;

/// Undo/redo stack of compressed model snapshots
pub struct UndoStack {
    snapshots: VecDeque<Vec<u8>>,
    /// Index of the snapshot matching the current model
    current: usize,
    max_snapshots: usize,
}

impl UndoStack {
    /// Create a stack keeping at most `max_snapshots` entries
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Record the model's current state, dropping any redo history
    pub fn push(&mut self, model: &WorkflowModel) -> Result<()> {
        let json = serde_json::to_vec(&to_document(model)?)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| ModelerError::Compression(e.to_string()))?;

        self.snapshots.truncate(self.current + 1);
        self.snapshots.push_back(compressed);
        self.current = self.snapshots.len() - 1;

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
            self.current = self.current.saturating_sub(1);
        }
        Ok(())
    }

    /// Step back one snapshot, `None` at the oldest one
    pub fn undo(&mut self) -> Option<Result<WorkflowModel>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        Some(self.restore(self.current))
    }

    /// Step forward one snapshot, `None` at the newest one
    pub fn redo(&mut self) -> Option<Result<WorkflowModel>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        Some(self.restore(self.current))
    }

    /// The snapshot matching the current model
    pub fn current(&self) -> Option<Result<WorkflowModel>> {
        (!self.snapshots.is_empty()).then(|| self.restore(self.current))
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = 0;
    }

    /// Total compressed size of all snapshots in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    fn restore(&self, index: usize) -> Result<WorkflowModel> {
        let compressed = self
            .snapshots
            .get(index)
            .ok_or_else(|| ModelerError::Compression(format!("no snapshot at {}", index)))?;
        let json = zstd::decode_all(&compressed[..])
            .map_err(|e| ModelerError::Compression(e.to_string()))?;
        from_document(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}
