use std::collections::HashMap;
use std::collections::hash_map;

use crate::palette::{ColorId, Palette};

// ============================================================================
// CELL COORDINATES
// ============================================================================

/// Integer grid coordinate.  Negative values are valid in free mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shifted cell, or `None` when a coordinate would leave the `i32` range.
    pub fn checked_offset(self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self { x: self.x.checked_add(dx)?, y: self.y.checked_add(dy)? })
    }

    /// Shifted cell, clamped to the `i32` range.
    pub fn saturating_offset(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x.saturating_add(dx), y: self.y.saturating_add(dy) }
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// 4-connected neighbour offsets (left, right, up, down).
pub const NEIGHBORS_4: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// 8-connected neighbour offsets in row-major order starting top-left.
/// Several algorithms break ties by this order, so it must not change.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0),           (1, 0),
    (-1, 1),  (0, 1),  (1, 1),
];

// ============================================================================
// SPARSE GRID
// ============================================================================

/// Sparse cell → color map.  A missing key means the cell is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BeadGrid {
    cells: HashMap<Cell, ColorId>,
}

impl BeadGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cell: Cell) -> Option<&ColorId> {
        self.cells.get(&cell)
    }

    pub fn set(&mut self, cell: Cell, color: impl Into<ColorId>) {
        self.cells.insert(cell, color.into());
    }

    /// Erasing removes the key; no tombstones are kept.
    pub fn remove(&mut self, cell: Cell) -> Option<ColorId> {
        self.cells.remove(&cell)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains_key(&cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Cell, ColorId> {
        self.cells.iter()
    }

    /// Tight bounding box of occupied cells as `(min, max)` inclusive.
    pub fn occupied_extent(&self) -> Option<(Cell, Cell)> {
        let mut iter = self.cells.keys();
        let first = *iter.next()?;
        let (mut min, mut max) = (first, first);
        for c in iter {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        Some((min, max))
    }

    /// Copy of the grid re-addressed so `origin` becomes `(0, 0)`.  Cells
    /// whose new coordinates do not fit an `i32` are left out.
    pub fn rebased(&self, origin: Cell) -> BeadGrid {
        BeadGrid {
            cells: self
                .cells
                .iter()
                .filter_map(|(c, id)| {
                    let x = i32::try_from(i64::from(c.x) - i64::from(origin.x)).ok()?;
                    let y = i32::try_from(i64::from(c.y) - i64::from(origin.y)).ok()?;
                    Some((Cell::new(x, y), id.clone()))
                })
                .collect(),
        }
    }

    /// Per-color bead counts, most used first; equal counts follow palette
    /// order, ids unknown to the palette go last.
    pub fn color_counts(&self, palette: &Palette) -> Vec<(ColorId, usize)> {
        let mut counts: HashMap<&ColorId, usize> = HashMap::new();
        for id in self.cells.values() {
            *counts.entry(id).or_insert(0) += 1;
        }
        let mut out: Vec<(ColorId, usize)> =
            counts.into_iter().map(|(id, n)| (id.clone(), n)).collect();
        out.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| {
                    let pa = palette.position(&a.0).unwrap_or(usize::MAX);
                    let pb = palette.position(&b.0).unwrap_or(usize::MAX);
                    pa.cmp(&pb)
                })
                .then_with(|| a.0.cmp(&b.0))
        });
        out
    }
}

impl FromIterator<(Cell, ColorId)> for BeadGrid {
    fn from_iter<I: IntoIterator<Item = (Cell, ColorId)>>(iter: I) -> Self {
        Self { cells: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a BeadGrid {
    type Item = (&'a Cell, &'a ColorId);
    type IntoIter = hash_map::Iter<'a, Cell, ColorId>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

// ============================================================================
// BOUNDS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GridMode {
    /// Bounds are set at creation and never change.
    #[default]
    Fixed,
    /// Bounds grow by whole chunks when an edit nears an edge.
    Free,
}

/// Growth tunables for free mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpandConfig {
    pub chunk: i32,
    pub margin: i32,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self { chunk: 20, margin: 5 }
    }
}

/// How far each edge moved outward during one growth step (all ≥ 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Expansion {
    pub grew_left: i64,
    pub grew_up: i64,
    pub grew_right: i64,
    pub grew_down: i64,
}

impl Expansion {
    pub fn is_empty(&self) -> bool {
        *self == Expansion::default()
    }
}

/// Half-open editable region `[min_x, max_x) × [min_y, max_y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub mode: GridMode,
}

impl Bounds {
    /// Fixed `[0,width) × [0,height)`; sizes are clamped to at least 1.
    pub fn fixed(width: u32, height: u32) -> Self {
        Self::sized(width, height, GridMode::Fixed)
    }

    /// Free-mode bounds starting at `[0,width) × [0,height)`.
    pub fn free(width: u32, height: u32) -> Self {
        Self::sized(width, height, GridMode::Free)
    }

    fn sized(width: u32, height: u32, mode: GridMode) -> Self {
        Self {
            min_x: 0,
            max_x: width.clamp(1, i32::MAX as u32) as i32,
            min_y: 0,
            max_y: height.clamp(1, i32::MAX as u32) as i32,
            mode,
        }
    }

    /// Explicit bounds; returns `None` when a range is empty.
    pub fn from_extents(min_x: i32, max_x: i32, min_y: i32, max_y: i32, mode: GridMode) -> Option<Self> {
        if min_x < max_x && min_y < max_y {
            Some(Self { min_x, max_x, min_y, max_y, mode })
        } else {
            None
        }
    }

    pub fn width(&self) -> u32 {
        (i64::from(self.max_x) - i64::from(self.min_x)) as u32
    }

    pub fn height(&self) -> u32 {
        (i64::from(self.max_y) - i64::from(self.min_y)) as u32
    }

    pub fn is_free(&self) -> bool {
        self.mode == GridMode::Free
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= self.min_x && cell.x < self.max_x && cell.y >= self.min_y && cell.y < self.max_y
    }

    /// Grow toward `cell` if it lies within `margin` of an edge (or beyond
    /// it).  Only free-mode bounds move, and only outward, by whole chunks.
    /// Edges stop at the `i32` limits, so the last column and row of the
    /// coordinate space stay outside the bounds.
    pub fn expand_toward(&mut self, cell: Cell, cfg: ExpandConfig) -> Expansion {
        let mut grown = Expansion::default();
        if self.mode != GridMode::Free {
            return grown;
        }
        let chunk = i64::from(cfg.chunk.max(1));
        let margin = i64::from(cfg.margin.max(0));
        let (x, y) = (i64::from(cell.x), i64::from(cell.y));

        let (min_x, left) = grow_low(self.min_x, margin - (x - i64::from(self.min_x)), chunk);
        let (max_x, right) = grow_high(self.max_x, x + margin + 1 - i64::from(self.max_x), chunk);
        let (min_y, up) = grow_low(self.min_y, margin - (y - i64::from(self.min_y)), chunk);
        let (max_y, down) = grow_high(self.max_y, y + margin + 1 - i64::from(self.max_y), chunk);

        self.min_x = min_x;
        self.max_x = max_x;
        self.min_y = min_y;
        self.max_y = max_y;
        grown.grew_left = left;
        grown.grew_right = right;
        grown.grew_up = up;
        grown.grew_down = down;
        grown
    }
}

/// Whole chunks covering `shortfall` cells; zero when nothing is missing.
fn chunks_for(shortfall: i64, chunk: i64) -> i64 {
    if shortfall <= 0 { 0 } else { (shortfall + chunk - 1) / chunk }
}

/// Move a low edge down by enough chunks, stopping at `i32::MIN`.
fn grow_low(edge: i32, shortfall: i64, chunk: i64) -> (i32, i64) {
    let target = (i64::from(edge) - chunks_for(shortfall, chunk) * chunk).max(i64::from(i32::MIN));
    (target as i32, i64::from(edge) - target)
}

/// Move a high edge up by enough chunks, stopping at `i32::MAX`.
fn grow_high(edge: i32, shortfall: i64, chunk: i64) -> (i32, i64) {
    let target = (i64::from(edge) + chunks_for(shortfall, chunk) * chunk).min(i64::from(i32::MAX));
    (target as i32, target - i64::from(edge))
}

// ============================================================================
// VIEWPORT
// ============================================================================

/// Screen transform of the external renderer: a cell at `c` is drawn at
/// `((c.x - min_x) * zoom + pan_x, (c.y - min_y) * zoom + pan_y)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub pan_x: f32,
    pub pan_y: f32,
    /// Screen pixels per cell.
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 12.0 }
    }
}

impl Viewport {
    /// Keep existing content still on screen after the low edges moved out.
    pub fn compensate(&mut self, grown: Expansion) {
        self.pan_x -= grown.grew_left as f32 * self.zoom;
        self.pan_y -= grown.grew_up as f32 * self.zoom;
    }

    pub fn cell_to_screen(&self, cell: Cell, bounds: &Bounds) -> (f32, f32) {
        (
            (i64::from(cell.x) - i64::from(bounds.min_x)) as f32 * self.zoom + self.pan_x,
            (i64::from(cell.y) - i64::from(bounds.min_y)) as f32 * self.zoom + self.pan_y,
        )
    }

    pub fn screen_to_cell(&self, sx: f32, sy: f32, bounds: &Bounds) -> Cell {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        Cell::new(
            (((sx - self.pan_x) / zoom).floor() as i32).saturating_add(bounds.min_x),
            (((sy - self.pan_y) / zoom).floor() as i32).saturating_add(bounds.min_y),
        )
    }
}

// ============================================================================
// CANVAS STATE
// ============================================================================

/// Grid, bounds and viewport, kept mutually consistent.
#[derive(Clone, Debug)]
pub struct CanvasState {
    pub grid: BeadGrid,
    pub bounds: Bounds,
    pub viewport: Viewport,
    pub expand: ExpandConfig,
}

impl CanvasState {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            grid: BeadGrid::new(),
            bounds,
            viewport: Viewport::default(),
            expand: ExpandConfig::default(),
        }
    }

    pub fn with_grid(grid: BeadGrid, bounds: Bounds) -> Self {
        Self { grid, ..Self::new(bounds) }
    }

    /// Validate an edit target.  Free mode grows the bounds (and shifts the
    /// viewport to match) and always accepts; fixed mode accepts only cells
    /// inside the bounds.
    pub fn prepare_edit(&mut self, cell: Cell) -> bool {
        match self.bounds.mode {
            GridMode::Fixed => self.bounds.contains(cell),
            GridMode::Free => {
                let grown = self.bounds.expand_toward(cell, self.expand);
                if !grown.is_empty() {
                    self.viewport.compensate(grown);
                    crate::log_info!(
                        "Free canvas grew to x[{}, {}) y[{}, {})",
                        self.bounds.min_x,
                        self.bounds.max_x,
                        self.bounds.min_y,
                        self.bounds.max_y
                    );
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::palette::PaletteColor;

    #[test]
    fn erase_removes_key() {
        let mut grid = BeadGrid::new();
        grid.set(Cell::new(-3, 4), "red");
        assert!(grid.contains(Cell::new(-3, 4)));
        assert_eq!(grid.remove(Cell::new(-3, 4)).as_deref(), Some("red"));
        assert!(grid.is_empty());
    }

    #[test]
    fn fixed_bounds_reject_outside_cells() {
        let mut canvas = CanvasState::new(Bounds::fixed(5, 5));
        assert!(canvas.prepare_edit(Cell::new(0, 0)));
        assert!(canvas.prepare_edit(Cell::new(4, 4)));
        assert!(!canvas.prepare_edit(Cell::new(5, 0)));
        assert!(!canvas.prepare_edit(Cell::new(0, -1)));
        assert_eq!(canvas.bounds, Bounds::fixed(5, 5));
    }

    #[test]
    fn free_bounds_grow_right_by_one_chunk() {
        let mut bounds = Bounds::free(100, 100);
        let grown = bounds.expand_toward(Cell::new(98, 50), ExpandConfig { chunk: 20, margin: 5 });
        assert_eq!(bounds.max_x, 120);
        assert_eq!(bounds.min_x, 0);
        assert_eq!(bounds.min_y, 0);
        assert_eq!(bounds.max_y, 100);
        assert_eq!(grown.grew_right, 20);
    }

    #[test]
    fn free_bounds_ignore_interior_edits() {
        let mut bounds = Bounds::free(100, 100);
        let grown = bounds.expand_toward(Cell::new(50, 50), ExpandConfig { chunk: 20, margin: 5 });
        assert!(grown.is_empty());
        assert_eq!(bounds, Bounds::free(100, 100));
    }

    #[test]
    fn free_bounds_grow_until_far_target_is_inside() {
        let mut bounds = Bounds::free(10, 10);
        bounds.expand_toward(Cell::new(-47, 3), ExpandConfig { chunk: 20, margin: 2 });
        assert_eq!(bounds.min_x, -60);
        assert!(bounds.contains(Cell::new(-47, 3)));
    }

    #[test]
    fn far_target_grows_in_one_step() {
        let mut bounds = Bounds::free(100, 100);
        let grown = bounds.expand_toward(Cell::new(1_000_000, 50), ExpandConfig { chunk: 20, margin: 5 });
        assert_eq!(bounds.max_x, 1_000_020);
        assert_eq!(grown.grew_right, 999_920);
        assert!(bounds.contains(Cell::new(1_000_000, 50)));
    }

    #[test]
    fn growth_stops_at_coordinate_limits() {
        let cfg = ExpandConfig { chunk: 20, margin: 5 };
        let mut bounds = Bounds::free(100, 100);
        bounds.expand_toward(Cell::new(i32::MAX - 1, i32::MIN), cfg);
        assert_eq!(bounds.max_x, i32::MAX);
        assert_eq!(bounds.min_y, i32::MIN);
        assert!(bounds.contains(Cell::new(i32::MAX - 1, i32::MIN)));
        assert_eq!(bounds.height(), (i64::from(bounds.max_y) - i64::from(i32::MIN)) as u32);

        // Already at the limit: nothing more to grow.
        let grown = bounds.expand_toward(Cell::new(i32::MAX, 0), cfg);
        assert_eq!(grown.grew_right, 0);
        assert_eq!(bounds.max_x, i32::MAX);
    }

    #[test]
    fn checked_offset_stops_at_limits() {
        assert_eq!(Cell::new(i32::MAX, 0).checked_offset(1, 0), None);
        assert_eq!(Cell::new(0, i32::MIN).checked_offset(0, -1), None);
        assert_eq!(Cell::new(3, 4).checked_offset(-1, 1), Some(Cell::new(2, 5)));
        assert_eq!(Cell::new(i32::MAX, 0).saturating_offset(5, 0), Cell::new(i32::MAX, 0));
    }

    #[test]
    fn rebase_across_full_range_drops_unrepresentable_cells() {
        let mut grid = BeadGrid::new();
        grid.set(Cell::new(i32::MIN, 0), "a");
        grid.set(Cell::new(-1, 0), "b");
        grid.set(Cell::new(i32::MAX, 0), "c");
        let out = grid.rebased(Cell::new(i32::MIN, 0));
        assert_eq!(out.get(Cell::new(0, 0)).map(String::as_str), Some("a"));
        assert_eq!(out.get(Cell::new(i32::MAX, 0)).map(String::as_str), Some("b"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn fixed_bounds_never_grow() {
        let mut bounds = Bounds::fixed(10, 10);
        let grown = bounds.expand_toward(Cell::new(9, 9), ExpandConfig::default());
        assert!(grown.is_empty());
        assert_eq!(bounds, Bounds::fixed(10, 10));
    }

    #[test]
    fn growing_left_shifts_viewport_so_content_stays_put() {
        let mut canvas = CanvasState::new(Bounds::free(100, 100));
        let anchor = Cell::new(10, 10);
        let before = canvas.viewport.cell_to_screen(anchor, &canvas.bounds);
        assert!(canvas.prepare_edit(Cell::new(1, 50)));
        assert_eq!(canvas.bounds.min_x, -20);
        let after = canvas.viewport.cell_to_screen(anchor, &canvas.bounds);
        assert_eq!(before, after);
    }

    #[test]
    fn screen_round_trip() {
        let bounds = Bounds::from_extents(-20, 40, -5, 30, GridMode::Free).unwrap();
        let vp = Viewport { pan_x: 13.0, pan_y: -7.0, zoom: 8.0 };
        let cell = Cell::new(-3, 17);
        let (sx, sy) = vp.cell_to_screen(cell, &bounds);
        assert_eq!(vp.screen_to_cell(sx + 1.0, sy + 1.0, &bounds), cell);
    }

    #[test]
    fn empty_extents_are_rejected() {
        assert!(Bounds::from_extents(3, 3, 0, 1, GridMode::Fixed).is_none());
        assert!(Bounds::from_extents(0, 1, 5, 2, GridMode::Free).is_none());
    }

    #[test]
    fn color_counts_order_by_count_then_palette() {
        let palette = Palette::new(
            "p",
            vec![
                PaletteColor::from_rgb("a", Rgb::new(0, 0, 0), "B", "1"),
                PaletteColor::from_rgb("b", Rgb::new(255, 255, 255), "B", "2"),
                PaletteColor::from_rgb("c", Rgb::new(255, 0, 0), "B", "3"),
            ],
        )
        .unwrap();
        let mut grid = BeadGrid::new();
        grid.set(Cell::new(0, 0), "c");
        grid.set(Cell::new(1, 0), "b");
        grid.set(Cell::new(2, 0), "a");
        grid.set(Cell::new(3, 0), "c");
        let counts = grid.color_counts(&palette);
        assert_eq!(
            counts,
            vec![("c".to_string(), 2), ("a".to_string(), 1), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn occupied_extent_spans_negative_cells() {
        let mut grid = BeadGrid::new();
        grid.set(Cell::new(-4, 2), "x");
        grid.set(Cell::new(6, -1), "x");
        assert_eq!(grid.occupied_extent(), Some((Cell::new(-4, -1), Cell::new(6, 2))));
        assert_eq!(BeadGrid::new().occupied_extent(), None);
    }
}
