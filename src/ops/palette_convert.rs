// ============================================================================
// PALETTE CONVERSION — re-map a finished pattern onto another bead brand
// ============================================================================

use std::collections::HashMap;

use crate::canvas::{BeadGrid, Bounds};
use crate::ops::denoise::denoise;
use crate::palette::{ColorId, Palette};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOutcome {
    pub grid: BeadGrid,
    /// Distinct source ids that mapped to a different target id.
    pub remapped: usize,
    /// Cells dropped because their id is unknown to both palettes.
    pub dropped: usize,
    /// Beads replaced by the optional denoise pass.
    pub denoised: usize,
}

/// Map every cell of `grid` from `from` onto the nearest color of `to`.
///
/// A cell's color is looked up in `from` and matched by its RGB.  Ids not in
/// `from` are kept as-is when `to` knows them and dropped otherwise.  When
/// `denoise_threshold` is set, one denoise pass runs on the result.
pub fn convert_palette(
    grid: &BeadGrid,
    bounds: &Bounds,
    from: &Palette,
    to: &Palette,
    denoise_threshold: Option<f64>,
) -> ConvertOutcome {
    let mut memo: HashMap<&str, Option<ColorId>> = HashMap::new();
    let mut out = BeadGrid::new();
    let mut dropped = 0;

    for (&cell, id) in grid.iter() {
        let mapped = memo.entry(id.as_str()).or_insert_with(|| match from.get(id) {
            Some(src) => Some(to.nearest(src.rgb()).id().to_string()),
            None if to.get(id).is_some() => Some(id.clone()),
            None => None,
        });
        match mapped {
            Some(target) => out.set(cell, target.clone()),
            None => dropped += 1,
        }
    }

    let remapped = memo
        .iter()
        .filter(|(src, dst)| dst.as_deref().is_some_and(|d| d != **src))
        .count();
    if dropped > 0 {
        crate::log_warn!(
            "Palette '{}' -> '{}': dropped {} beads with unknown colors",
            from.name(),
            to.name(),
            dropped
        );
    }

    let mut denoised = 0;
    if let Some(threshold) = denoise_threshold {
        let pass = denoise(&out, bounds, to, threshold);
        denoised = pass.replaced;
        out = pass.grid;
    }

    crate::log_info!(
        "Converted {} beads from '{}' to '{}' ({} colors remapped)",
        out.len(),
        from.name(),
        to.name(),
        remapped
    );
    ConvertOutcome { grid: out, remapped, dropped, denoised }
}
