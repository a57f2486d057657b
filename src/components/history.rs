use crate::canvas::BeadGrid;

// ============================================================================
// SNAPSHOT HISTORY
// ============================================================================

/// Linear undo/redo over whole-grid snapshots.
///
/// `snapshots[cursor]` always equals the live grid after a commit, undo or
/// redo.  Grids here are small (at most tens of thousands of cells), so full
/// copies stay cheap.
#[derive(Clone, Debug)]
pub struct HistoryManager {
    snapshots: Vec<BeadGrid>,
    cursor: usize,
    /// Upper bound on stored snapshots (including the current one).
    max_history_size: usize,
    descriptions: Vec<String>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistoryManager {
    /// History starting from one empty grid.
    pub fn new(max_history_size: usize) -> Self {
        Self::with_initial(BeadGrid::new(), max_history_size)
    }

    /// History starting from `initial`, e.g. a freshly converted pattern.
    pub fn with_initial(initial: BeadGrid, max_history_size: usize) -> Self {
        Self {
            snapshots: vec![initial],
            cursor: 0,
            max_history_size: max_history_size.max(2),
            descriptions: vec![String::new()],
        }
    }

    /// Record `grid` as the newest state.  Returns `false` (and stores
    /// nothing) when it equals the snapshot at the cursor.
    pub fn commit(&mut self, grid: &BeadGrid, description: &str) -> bool {
        if self.snapshots[self.cursor] == *grid {
            return false;
        }
        self.snapshots.truncate(self.cursor + 1);
        self.descriptions.truncate(self.cursor + 1);
        self.snapshots.push(grid.clone());
        self.descriptions.push(description.to_string());
        self.cursor = self.snapshots.len() - 1;
        self.prune();
        true
    }

    /// Step back one entry and return the grid to restore.
    pub fn undo(&mut self) -> Option<&BeadGrid> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.snapshots[self.cursor])
    }

    /// Step forward one entry and return the grid to restore.
    pub fn redo(&mut self) -> Option<&BeadGrid> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.snapshots[self.cursor])
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn current(&self) -> &BeadGrid {
        &self.snapshots[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Description of the entry an undo would revert.
    pub fn undo_description(&self) -> Option<&str> {
        if self.can_undo() {
            Some(self.descriptions[self.cursor].as_str())
        } else {
            None
        }
    }

    /// Description of the entry a redo would re-apply.
    pub fn redo_description(&self) -> Option<&str> {
        if self.can_redo() {
            Some(self.descriptions[self.cursor + 1].as_str())
        } else {
            None
        }
    }

    /// Forget everything and start over from `grid`.
    pub fn reset(&mut self, grid: BeadGrid) {
        self.snapshots = vec![grid];
        self.descriptions = vec![String::new()];
        self.cursor = 0;
    }

    /// Drop the oldest snapshots once over the size limit.
    fn prune(&mut self) {
        let excess = self.snapshots.len().saturating_sub(self.max_history_size);
        if excess > 0 {
            self.snapshots.drain(..excess);
            self.descriptions.drain(..excess);
            self.cursor -= excess;
        }
    }
}
