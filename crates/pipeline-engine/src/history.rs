//! Undo/redo history using compressed snapshots
//!
//! Each entry is a full `{nodes, edges}` snapshot serialized to JSON and
//! zstd-compressed. Snapshots are pushed explicitly before a mutating user
//! action; undo and redo swap the live graph with the top of the opposite
//! stack.

use std::collections::VecDeque;

use crate::error::{PipelineError, Result};
use crate::types::GraphSnapshot;

/// Default bound on the undo stack depth
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Paired undo/redo stacks of compressed graph snapshots
pub struct History {
    /// Oldest snapshot at the front
    undo: VecDeque<Vec<u8>>,
    redo: Vec<Vec<u8>>,
    max_depth: usize,
}

impl History {
    /// Create a history bounded to `max_depth` undo entries
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Push a snapshot onto the undo stack
    ///
    /// Clears the redo stack and drops the oldest entries beyond the bound.
    pub fn push(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        let compressed = compress(snapshot)?;
        self.redo.clear();
        self.undo.push_back(compressed);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
        Ok(())
    }

    /// Step back: returns the snapshot to restore, stashing `current` for redo
    ///
    /// Returns `None` when there is nothing to undo. On error neither stack
    /// is modified.
    pub fn undo(&mut self, current: &GraphSnapshot) -> Option<Result<GraphSnapshot>> {
        let top = self.undo.back()?;
        let restored = match decompress(top) {
            Ok(snapshot) => snapshot,
            Err(e) => return Some(Err(e)),
        };
        let stashed = match compress(current) {
            Ok(bytes) => bytes,
            Err(e) => return Some(Err(e)),
        };
        self.undo.pop_back();
        self.redo.push(stashed);
        Some(Ok(restored))
    }

    /// Step forward: returns the snapshot to restore, stashing `current` for undo
    pub fn redo(&mut self, current: &GraphSnapshot) -> Option<Result<GraphSnapshot>> {
        let top = self.redo.last()?;
        let restored = match decompress(top) {
            Ok(snapshot) => snapshot,
            Err(e) => return Some(Err(e)),
        };
        let stashed = match compress(current) {
            Ok(bytes) => bytes,
            Err(e) => return Some(Err(e)),
        };
        self.redo.pop();
        self.undo.push_back(stashed);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
        Some(Ok(restored))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Clear both stacks
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

fn compress(snapshot: &GraphSnapshot) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(snapshot)?;
    zstd::encode_all(&json[..], 3).map_err(|e| PipelineError::Compression(e.to_string()))
}

fn decompress(bytes: &[u8]) -> Result<GraphSnapshot> {
    let json = zstd::decode_all(bytes).map_err(|e| PipelineError::Compression(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Node, NodeKind};

    fn make_snapshot(label: &str) -> GraphSnapshot {
        GraphSnapshot {
            nodes: vec![Node::new("node1", NodeKind::Function, label)],
            edges: Vec::new(),
        }
    }

    fn label(snapshot: &GraphSnapshot) -> &str {
        &snapshot.nodes[0].label
    }

    #[test]
    fn test_undo_returns_pushed_snapshot() {
        let mut history = History::new(10);
        history.push(&make_snapshot("first")).unwrap();

        let restored = history.undo(&make_snapshot("second")).unwrap().unwrap();
        assert_eq!(label(&restored), "first");
        assert!(!history.can_undo());
        assert!(history.can_redo());

        // Can't undo further
        assert!(history.undo(&restored).is_none());
    }

    #[test]
    fn test_redo_restores_state_before_undo() {
        let mut history = History::new(10);
        history.push(&make_snapshot("first")).unwrap();

        let current = make_snapshot("second");
        let undone = history.undo(&current).unwrap().unwrap();
        let redone = history.redo(&undone).unwrap().unwrap();
        assert_eq!(redone, current);

        // Can't redo further
        assert!(history.redo(&redone).is_none());
        assert!(history.can_undo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = History::new(10);
        history.push(&make_snapshot("first")).unwrap();
        history.undo(&make_snapshot("second")).unwrap().unwrap();
        assert!(history.can_redo());

        history.push(&make_snapshot("third")).unwrap();
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_bound_drops_oldest() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.push(&make_snapshot(&format!("graph_{}", i))).unwrap();
        }
        assert_eq!(history.undo_len(), 3);

        let current = make_snapshot("live");
        let a = history.undo(&current).unwrap().unwrap();
        let b = history.undo(&a).unwrap().unwrap();
        let c = history.undo(&b).unwrap().unwrap();
        assert_eq!(label(&a), "graph_4");
        assert_eq!(label(&b), "graph_3");
        assert_eq!(label(&c), "graph_2");
        assert!(history.undo(&c).is_none());
    }

    #[test]
    fn test_zero_depth_keeps_one() {
        let history = History::new(0);
        assert_eq!(history.max_depth(), 1);
    }
}
