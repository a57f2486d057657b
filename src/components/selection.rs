use std::collections::HashMap;

use crate::canvas::{CanvasState, Cell};
use crate::components::history::HistoryManager;
use crate::palette::ColorId;

// ============================================================================
// RECTANGULAR MOVE SELECTION
// ============================================================================
//
//   Idle ──press──▶ Selecting ──release──▶ Active ──press inside──▶ Dragging
//     ▲                 │ (nothing lifted)     │ ◀───────release────────┘
//     └─────────────────┴──── commit / cancel ─┘

/// Pixels lifted out of the grid, keyed by the cell they were lifted from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatingSelection {
    /// Inclusive corners of the captured rectangle, in grid coordinates.
    pub rect_min: Cell,
    pub rect_max: Cell,
    pub pixels: HashMap<Cell, ColorId>,
    /// Accumulated drag delta in cells.
    pub offset: (i32, i32),
    drag: Option<DragState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DragState {
    anchor: Cell,
    offset_at_start: (i32, i32),
}

impl FloatingSelection {
    /// Whether `cell` falls inside the rectangle at its current offset.
    pub fn contains(&self, cell: Cell) -> bool {
        let (dx, dy) = (i64::from(self.offset.0), i64::from(self.offset.1));
        let (x, y) = (i64::from(cell.x), i64::from(cell.y));
        x >= i64::from(self.rect_min.x) + dx
            && x <= i64::from(self.rect_max.x) + dx
            && y >= i64::from(self.rect_min.y) + dy
            && y <= i64::from(self.rect_max.y) + dy
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Position of every floating pixel at the current offset.  Pixels
    /// moved past the `i32` range have no position and are skipped.
    pub fn placed_cells(&self) -> impl Iterator<Item = (Cell, &ColorId)> + '_ {
        let (dx, dy) = self.offset;
        self.pixels
            .iter()
            .filter_map(move |(origin, id)| Some((origin.checked_offset(dx, dy)?, id)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SelectionPhase {
    #[default]
    Idle,
    Selecting { start: Cell, end: Cell },
    Active(FloatingSelection),
}

/// What a press did, so the caller can react (e.g. redraw, status text).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressOutcome {
    StartedMarquee,
    StartedDrag,
    /// The previous selection was stamped down and a new marquee begun.
    CommittedAndStartedMarquee,
}

#[derive(Clone, Debug, Default)]
pub struct Selection {
    phase: SelectionPhase,
}

impl Selection {
    pub fn phase(&self) -> &SelectionPhase {
        &self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, SelectionPhase::Active(_))
    }

    pub fn floating(&self) -> Option<&FloatingSelection> {
        match &self.phase {
            SelectionPhase::Active(f) => Some(f),
            _ => None,
        }
    }

    /// Rectangle to outline, normalized and including any drag offset.
    pub fn outline(&self) -> Option<(Cell, Cell)> {
        match &self.phase {
            SelectionPhase::Idle => None,
            SelectionPhase::Selecting { start, end } => Some(normalize(*start, *end)),
            SelectionPhase::Active(f) => {
                let (dx, dy) = f.offset;
                Some((f.rect_min.saturating_offset(dx, dy), f.rect_max.saturating_offset(dx, dy)))
            }
        }
    }

    /// Marquee tool pressed at `cell`.
    pub fn press(
        &mut self,
        cell: Cell,
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
    ) -> PressOutcome {
        if let SelectionPhase::Active(floating) = &mut self.phase {
            if floating.contains(cell) {
                floating.drag = Some(DragState { anchor: cell, offset_at_start: floating.offset });
                return PressOutcome::StartedDrag;
            }
            self.commit(canvas, history);
            self.phase = SelectionPhase::Selecting { start: cell, end: cell };
            return PressOutcome::CommittedAndStartedMarquee;
        }
        self.phase = SelectionPhase::Selecting { start: cell, end: cell };
        PressOutcome::StartedMarquee
    }

    /// Pointer moved to `cell` while pressed.
    pub fn drag_to(&mut self, cell: Cell) {
        match &mut self.phase {
            SelectionPhase::Selecting { end, .. } => *end = cell,
            SelectionPhase::Active(floating) => {
                if let Some(drag) = floating.drag {
                    floating.offset = (
                        drag_axis(drag.offset_at_start.0, cell.x, drag.anchor.x),
                        drag_axis(drag.offset_at_start.1, cell.y, drag.anchor.y),
                    );
                }
            }
            SelectionPhase::Idle => {}
        }
    }

    /// Pointer released.  Ending a marquee lifts the enclosed pixels out of
    /// the grid; an empty capture drops back to idle.  Returns the number of
    /// pixels lifted.
    pub fn release(&mut self, canvas: &mut CanvasState) -> usize {
        match &mut self.phase {
            SelectionPhase::Selecting { start, end } => {
                let (rect_min, rect_max) = normalize(*start, *end);
                let inside: Vec<Cell> = canvas
                    .grid
                    .iter()
                    .map(|(c, _)| *c)
                    .filter(|c| {
                        c.x >= rect_min.x && c.x <= rect_max.x && c.y >= rect_min.y && c.y <= rect_max.y
                    })
                    .collect();

                let mut pixels = HashMap::with_capacity(inside.len());
                for cell in inside {
                    if let Some(id) = canvas.grid.remove(cell) {
                        pixels.insert(cell, id);
                    }
                }

                let lifted = pixels.len();
                self.phase = if pixels.is_empty() {
                    SelectionPhase::Idle
                } else {
                    SelectionPhase::Active(FloatingSelection {
                        rect_min,
                        rect_max,
                        pixels,
                        offset: (0, 0),
                        drag: None,
                    })
                };
                lifted
            }
            SelectionPhase::Active(floating) => {
                floating.drag = None;
                0
            }
            SelectionPhase::Idle => 0,
        }
    }

    /// Stamp the floating pixels down at their current offset, overwriting
    /// what is there, and push one history entry.  Pixels that would land
    /// outside fixed bounds, or outside the `i32` range, are dropped.  Returns `false` when there
    /// was nothing to commit.
    pub fn commit(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        let floating = match std::mem::take(&mut self.phase) {
            SelectionPhase::Active(f) => f,
            // A half-drawn marquee has lifted nothing yet.
            _ => return false,
        };
        let placed: Vec<(Cell, ColorId)> =
            floating.placed_cells().map(|(c, id)| (c, id.clone())).collect();
        for (cell, id) in placed {
            if canvas.prepare_edit(cell) {
                canvas.grid.set(cell, id);
            }
        }
        history.commit(&canvas.grid, "Move Selection");
        true
    }

    /// Put the floating pixels back where they were lifted from, without a
    /// history entry.
    pub fn cancel(&mut self, canvas: &mut CanvasState) {
        if let SelectionPhase::Active(floating) = std::mem::take(&mut self.phase) {
            for (origin, id) in floating.pixels {
                canvas.grid.set(origin, id);
            }
        }
    }

    /// Throw the floating pixels away and commit the result.
    pub fn delete(&mut self, canvas: &CanvasState, history: &mut HistoryManager) -> bool {
        if !self.is_active() {
            return false;
        }
        self.phase = SelectionPhase::Idle;
        history.commit(&canvas.grid, "Delete Selection");
        true
    }
}

/// Drag offset along one axis, clamped to the `i32` range.
fn drag_axis(start: i32, pointer: i32, anchor: i32) -> i32 {
    let moved = i64::from(start) + i64::from(pointer) - i64::from(anchor);
    moved.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Order two corners into `(min, max)`.
pub fn normalize(a: Cell, b: Cell) -> (Cell, Cell) {
    (
        Cell::new(a.x.min(b.x), a.y.min(b.y)),
        Cell::new(a.x.max(b.x), a.y.max(b.y)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BeadGrid, Bounds};

    fn setup() -> (CanvasState, HistoryManager) {
        let mut canvas = CanvasState::new(Bounds::fixed(20, 20));
        canvas.grid.set(Cell::new(2, 2), "a");
        canvas.grid.set(Cell::new(3, 2), "b");
        canvas.grid.set(Cell::new(2, 3), "c");
        canvas.grid.set(Cell::new(10, 10), "outside");
        let mut history = HistoryManager::new(50);
        history.commit(&canvas.grid, "setup");
        (canvas, history)
    }

    fn select(sel: &mut Selection, canvas: &mut CanvasState, history: &mut HistoryManager, a: Cell, b: Cell) -> usize {
        sel.press(a, canvas, history);
        sel.drag_to(b);
        sel.release(canvas)
    }

    #[test]
    fn release_lifts_cells_into_floating_buffer() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        let lifted = select(&mut sel, &mut canvas, &mut history, Cell::new(4, 4), Cell::new(1, 1));
        assert_eq!(lifted, 3);
        assert!(sel.is_active());
        assert_eq!(canvas.grid.len(), 1);

        let floating = sel.floating().unwrap();
        assert_eq!(floating.rect_min, Cell::new(1, 1));
        assert_eq!(floating.pixels.get(&Cell::new(2, 2)).map(String::as_str), Some("a"));
        assert_eq!(floating.pixels.get(&Cell::new(3, 2)).map(String::as_str), Some("b"));
    }

    #[test]
    fn empty_capture_returns_to_idle() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        let lifted = select(&mut sel, &mut canvas, &mut history, Cell::new(15, 15), Cell::new(18, 18));
        assert_eq!(lifted, 0);
        assert_eq!(sel.phase(), &SelectionPhase::Idle);
        assert_eq!(canvas.grid.len(), 4);
    }

    #[test]
    fn drag_and_commit_moves_colors() {
        let (mut canvas, mut history) = setup();
        let original = canvas.grid.clone();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(3, 3));

        assert_eq!(sel.press(Cell::new(2, 2), &mut canvas, &mut history), PressOutcome::StartedDrag);
        sel.drag_to(Cell::new(4, 6));
        sel.drag_to(Cell::new(7, 8));
        sel.release(&mut canvas);
        assert!(sel.commit(&mut canvas, &mut history));

        let (dx, dy) = (5, 6);
        for (cell, id) in original.iter() {
            if *id == "outside" {
                continue;
            }
            assert_eq!(canvas.grid.get(cell.checked_offset(dx, dy).unwrap()), Some(id));
            assert_eq!(canvas.grid.get(*cell), None);
        }
        assert_eq!(sel.phase(), &SelectionPhase::Idle);
        assert_eq!(history.undo_description(), Some("Move Selection"));
    }

    #[test]
    fn drags_accumulate_across_presses() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(3, 3));

        sel.press(Cell::new(2, 2), &mut canvas, &mut history);
        sel.drag_to(Cell::new(3, 2));
        sel.release(&mut canvas);
        // Rectangle now sits at x 3..=4; press inside its moved position.
        assert_eq!(sel.press(Cell::new(4, 3), &mut canvas, &mut history), PressOutcome::StartedDrag);
        sel.drag_to(Cell::new(4, 5));
        sel.release(&mut canvas);
        assert_eq!(sel.floating().unwrap().offset, (1, 2));
    }

    #[test]
    fn press_outside_commits_then_starts_new_marquee() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(3, 3));
        let outcome = sel.press(Cell::new(15, 0), &mut canvas, &mut history);
        assert_eq!(outcome, PressOutcome::CommittedAndStartedMarquee);
        assert_eq!(canvas.grid.len(), 4);
        assert!(matches!(sel.phase(), SelectionPhase::Selecting { .. }));
    }

    #[test]
    fn commit_overwrites_destination() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(2, 2));
        sel.press(Cell::new(2, 2), &mut canvas, &mut history);
        sel.drag_to(Cell::new(3, 2));
        sel.commit(&mut canvas, &mut history);
        assert_eq!(canvas.grid.get(Cell::new(3, 2)).map(String::as_str), Some("a"));
        assert_eq!(canvas.grid.get(Cell::new(2, 2)), None);
    }

    #[test]
    fn fixed_mode_commit_drops_pixels_outside_bounds() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(3, 3));
        sel.press(Cell::new(2, 2), &mut canvas, &mut history);
        sel.drag_to(Cell::new(-1, 2));
        sel.commit(&mut canvas, &mut history);
        // a → (-1,2) and c → (-1,3) fall off; b → (0,2) survives.
        assert_eq!(canvas.grid.get(Cell::new(0, 2)).map(String::as_str), Some("b"));
        assert_eq!(canvas.grid.len(), 2);
    }

    #[test]
    fn free_mode_commit_grows_bounds() {
        let mut canvas = CanvasState::new(Bounds::free(20, 20));
        canvas.grid.set(Cell::new(10, 10), "a");
        let mut history = HistoryManager::new(10);
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(10, 10), Cell::new(10, 10));
        sel.press(Cell::new(10, 10), &mut canvas, &mut history);
        sel.drag_to(Cell::new(-30, 10));
        sel.commit(&mut canvas, &mut history);
        assert_eq!(canvas.grid.get(Cell::new(-30, 10)).map(String::as_str), Some("a"));
        assert!(canvas.bounds.contains(Cell::new(-30, 10)));
    }

    #[test]
    fn cancel_restores_original_positions_without_history() {
        let (mut canvas, mut history) = setup();
        let before: BeadGrid = canvas.grid.clone();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(3, 3));
        sel.press(Cell::new(2, 2), &mut canvas, &mut history);
        sel.drag_to(Cell::new(9, 9));
        sel.cancel(&mut canvas);
        assert_eq!(canvas.grid, before);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn pixels_dragged_past_coordinate_limit_are_dropped() {
        let edge = i32::MAX - 1;
        let mut canvas = CanvasState::new(Bounds::free(20, 20));
        canvas.grid.set(Cell::new(edge, 0), "a");
        canvas.grid.set(Cell::new(edge - 1, 0), "b");
        let mut history = HistoryManager::new(10);
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(edge - 1, 0), Cell::new(edge, 0));
        sel.press(Cell::new(edge - 1, 0), &mut canvas, &mut history);
        sel.drag_to(Cell::new(i32::MAX, 0));
        assert_eq!(sel.floating().unwrap().offset, (2, 0));
        assert!(sel.floating().unwrap().contains(Cell::new(i32::MAX, 0)));

        sel.commit(&mut canvas, &mut history);
        // b lands on i32::MAX; a would land one past it.
        assert_eq!(canvas.grid.get(Cell::new(i32::MAX, 0)).map(String::as_str), Some("b"));
        assert_eq!(canvas.grid.len(), 1);
    }

    #[test]
    fn delete_discards_floating_pixels() {
        let (mut canvas, mut history) = setup();
        let mut sel = Selection::default();
        select(&mut sel, &mut canvas, &mut history, Cell::new(2, 2), Cell::new(3, 3));
        assert!(sel.delete(&canvas, &mut history));
        assert_eq!(canvas.grid.len(), 1);
        assert_eq!(history.undo_description(), Some("Delete Selection"));
    }
}
