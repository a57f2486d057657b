// ============================================================================
// DENOISE — one-pass isolated bead cleanup
// ============================================================================

use crate::canvas::{BeadGrid, Bounds, NEIGHBORS_8};
use crate::palette::{ColorId, Palette};

/// Result of one denoise pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenoiseOutcome {
    pub grid: BeadGrid,
    /// Isolated beads overwritten with their majority neighbour.
    pub replaced: usize,
    /// Isolated beads kept because they differ too much from their surroundings.
    pub preserved: usize,
}

/// Most frequent colour among `neighbours`; equal counts keep the one seen first.
fn majority(neighbours: &[&ColorId]) -> Option<ColorId> {
    let mut tally: Vec<(&ColorId, usize)> = Vec::with_capacity(8);
    for id in neighbours {
        match tally.iter().position(|(seen, _)| seen == id) {
            Some(i) => tally[i].1 += 1,
            None => tally.push((*id, 1)),
        }
    }
    let mut best: Option<(&ColorId, usize)> = None;
    for (id, n) in tally {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((id, n));
        }
    }
    best.map(|(id, _)| id.clone())
}

/// Run one pass over `grid`.  Every decision reads the input grid, so the
/// order cells are visited in does not matter.  Cells outside `bounds` and
/// cells whose colour (or majority neighbour) is not in `palette` are left
/// alone.
pub fn denoise(grid: &BeadGrid, bounds: &Bounds, palette: &Palette, threshold: f64) -> DenoiseOutcome {
    let mut out = grid.clone();
    let mut replaced = 0;
    let mut preserved = 0;

    for (&cell, color) in grid.iter() {
        if !bounds.contains(cell) {
            continue;
        }
        let neighbours: Vec<&ColorId> = NEIGHBORS_8
            .iter()
            .filter_map(|&(dx, dy)| grid.get(cell.checked_offset(dx, dy)?))
            .collect();
        if neighbours.is_empty() || neighbours.contains(&color) {
            continue;
        }
        let Some(major) = majority(&neighbours) else {
            continue;
        };
        let (Some(own), Some(other)) = (palette.lab_of(color), palette.lab_of(&major)) else {
            continue;
        };
        if own.delta_e(other) > threshold {
            preserved += 1;
        } else {
            out.set(cell, major);
            replaced += 1;
        }
    }

    if replaced > 0 || preserved > 0 {
        crate::log_info!(
            "Denoise (threshold {:.1}): replaced {}, preserved {}",
            threshold,
            replaced,
            preserved
        );
    }
    DenoiseOutcome { grid: out, replaced, preserved }
}
