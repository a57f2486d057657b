use std::collections::{HashSet, VecDeque};

use crate::canvas::{BeadGrid, CanvasState, Cell, GridMode, NEIGHBORS_4};
use crate::components::history::HistoryManager;
use crate::palette::ColorId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
    ColorPicker,
    Fill,
    MagicWand,
    Marquee,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pen => "Pen",
            Tool::Eraser => "Eraser",
            Tool::ColorPicker => "Color Picker",
            Tool::Fill => "Fill",
            Tool::MagicWand => "Magic Wand",
            Tool::Marquee => "Marquee",
        }
    }

    /// Pen and eraser work in strokes that commit once on release.
    pub fn is_stroke_tool(&self) -> bool {
        matches!(self, Tool::Pen | Tool::Eraser)
    }
}

/// Active tool plus the color it paints with.
#[derive(Clone, Debug, Default)]
pub struct ToolState {
    pub tool: Tool,
    pub selected_color: Option<ColorId>,
}

// ============================================================================
// STROKES
// ============================================================================

/// Tracks one pointer-down → up gesture so it lands in history as one entry.
#[derive(Clone, Debug, Default)]
pub struct StrokeTracker {
    pub is_active: bool,
    /// Grid as it was when the stroke began.
    pub before: Option<BeadGrid>,
    /// e.g. "Pen Stroke", "Eraser Stroke"
    pub description: String,
    /// Cells touched so far.
    pub touched: usize,
}

impl StrokeTracker {
    pub fn start(&mut self, grid: &BeadGrid, description: &str) {
        self.is_active = true;
        self.before = Some(grid.clone());
        self.description = description.to_string();
        self.touched = 0;
    }

    pub fn record(&mut self) {
        self.touched += 1;
    }

    /// End the stroke and commit the resulting grid.  A stroke that changed
    /// no cell adds nothing.  Returns whether a history entry was added.
    pub fn finish(&mut self, grid: &BeadGrid, history: &mut HistoryManager) -> bool {
        if !self.is_active {
            return false;
        }
        let committed = self.touched > 0 && history.commit(grid, &self.description);
        self.reset();
        committed
    }

    /// Abort the stroke, handing back the grid to restore.
    pub fn cancel(&mut self) -> Option<BeadGrid> {
        let before = self.before.take();
        self.reset();
        before
    }

    fn reset(&mut self) {
        self.is_active = false;
        self.before = None;
        self.description.clear();
        self.touched = 0;
    }
}

// ============================================================================
// SINGLE-CELL TOOLS
// ============================================================================

/// Pen: write `color` at `cell`.  Returns `true` when the grid changed.
pub fn paint(canvas: &mut CanvasState, cell: Cell, color: &str) -> bool {
    if !canvas.prepare_edit(cell) {
        return false;
    }
    if canvas.grid.get(cell).map(String::as_str) == Some(color) {
        return false;
    }
    canvas.grid.set(cell, color);
    true
}

/// Eraser: remove whatever is at `cell`.  Never grows free-mode bounds.
pub fn erase(canvas: &mut CanvasState, cell: Cell) -> bool {
    if canvas.bounds.mode == GridMode::Fixed && !canvas.bounds.contains(cell) {
        return false;
    }
    canvas.grid.remove(cell).is_some()
}

/// Color picker: adopt the color under `cell` and switch to the pen.
/// Empty cells leave the tool state untouched.
pub fn pick(grid: &BeadGrid, cell: Cell, tools: &mut ToolState) -> Option<ColorId> {
    let color = grid.get(cell)?.clone();
    tools.selected_color = Some(color.clone());
    tools.tool = Tool::Pen;
    Some(color)
}

// ============================================================================
// FLOOD FILL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FillOutcome {
    pub filled: usize,
    /// The visitation cap stopped the fill early.
    pub capped: bool,
}

/// 4-connected breadth-first fill from `start`.
///
/// Spreads through cells whose color equals the start cell's color, where an
/// empty start only spreads through empty cells.  Fixed-mode fills stay inside
/// the bounds; free-mode fills are limited only by `cap` and grow the bounds
/// to cover what they wrote.
pub fn flood_fill(canvas: &mut CanvasState, start: Cell, color: &str, cap: usize) -> FillOutcome {
    let mut outcome = FillOutcome::default();
    let fixed = canvas.bounds.mode == GridMode::Fixed;
    if fixed && !canvas.bounds.contains(start) {
        return outcome;
    }

    let target: Option<ColorId> = canvas.grid.get(start).cloned();
    if target.as_deref() == Some(color) {
        return outcome;
    }

    let mut visited: HashSet<Cell> = HashSet::new();
    let mut queue: VecDeque<Cell> = VecDeque::with_capacity(256);
    let mut written: Vec<Cell> = Vec::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(cell) = queue.pop_front() {
        if outcome.filled >= cap {
            outcome.capped = true;
            break;
        }
        canvas.grid.set(cell, color);
        written.push(cell);
        outcome.filled += 1;

        for (dx, dy) in NEIGHBORS_4 {
            let Some(next) = cell.checked_offset(dx, dy) else {
                continue;
            };
            if fixed && !canvas.bounds.contains(next) {
                continue;
            }
            if visited.contains(&next) {
                continue;
            }
            if canvas.grid.get(next) == target.as_ref() {
                visited.insert(next);
                queue.push_back(next);
            }
        }
    }

    if !fixed {
        for cell in written {
            canvas.prepare_edit(cell);
        }
    }
    if outcome.capped {
        crate::log_info!("Flood fill stopped at cap of {} cells", cap);
    }
    outcome
}

// ============================================================================
// MAGIC WAND
// ============================================================================

/// Every cell in the grid sharing one color, regardless of connectivity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WandSelection {
    pub color: ColorId,
    pub cells: Vec<Cell>,
}

impl WandSelection {
    pub fn count(&self) -> usize {
        self.cells.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WandAction {
    Delete,
    Replace(ColorId),
}

/// Collect all cells with the same color as `cell`.  `None` on an empty cell.
pub fn magic_wand_select(grid: &BeadGrid, cell: Cell) -> Option<WandSelection> {
    let color = grid.get(cell)?.clone();
    let mut cells: Vec<Cell> = grid
        .iter()
        .filter(|(_, id)| **id == color)
        .map(|(c, _)| *c)
        .collect();
    cells.sort_by_key(|c| (c.y, c.x));
    Some(WandSelection { color, cells })
}

/// Apply a confirmed wand selection and commit it as one history entry.
/// Cells whose color changed since the selection was made are left alone.
pub fn apply_wand(
    canvas: &mut CanvasState,
    selection: &WandSelection,
    action: &WandAction,
    history: &mut HistoryManager,
) -> usize {
    let mut changed = 0;
    for &cell in &selection.cells {
        if canvas.grid.get(cell) != Some(&selection.color) {
            continue;
        }
        match action {
            WandAction::Delete => {
                canvas.grid.remove(cell);
            }
            WandAction::Replace(color) => {
                canvas.grid.set(cell, color.clone());
            }
        }
        changed += 1;
    }
    let description = match action {
        WandAction::Delete => "Delete Color",
        WandAction::Replace(_) => "Replace Color",
    };
    history.commit(&canvas.grid, description);
    changed
}
