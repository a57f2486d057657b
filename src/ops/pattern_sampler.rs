// ============================================================================
// PATTERN SAMPLER — digitize a photographed bead pattern through a
// user-calibrated virtual grid
// ============================================================================
//
// The overlay is positioned in source-image pixels: cell (col, row) occupies
// the square [col*size, (col+1)*size) x [row*size, (row+1)*size) in grid-local
// space, which is rotated about the grid origin and then translated by the
// offset.  Each cell is classified by a 3x3 consensus of samples so a couple
// of misaligned samples cannot flip the result.

use std::time::Instant;

use crate::canvas::{BeadGrid, Cell};
use crate::color::Rgb;
use crate::ops::SourceImage;
use crate::palette::Palette;

/// Sub-sample offsets as a fraction of the cell size.
const SAMPLE_OFFSETS: [f64; 3] = [-0.3, 0.0, 0.3];

/// Channel quantization step used for voting.
const BUCKET_STEP: f64 = 32.0;

/// Smallest allowed cell size in source pixels.
pub const MIN_CELL_SIZE: f64 = 1.0;

/// Overlay placement chosen by the user.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub offset_x: f64,
    pub offset_y: f64,
    pub cell_size: f64,
    pub rotation_degrees: f64,
    pub cols: u32,
    pub rows: u32,
    pub target_palette_id: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            cell_size: 10.0,
            rotation_degrees: 0.0,
            cols: 29,
            rows: 29,
            target_palette_id: String::new(),
        }
    }
}

impl Calibration {
    fn sin_cos(&self) -> (f64, f64) {
        self.rotation_degrees.to_radians().sin_cos()
    }

    /// Map a grid-local point to source-image pixels.
    pub fn local_to_source(&self, lx: f64, ly: f64) -> (f64, f64) {
        let (sin, cos) = self.sin_cos();
        (
            lx * cos - ly * sin + self.offset_x,
            lx * sin + ly * cos + self.offset_y,
        )
    }

    /// Inverse of [`local_to_source`](Self::local_to_source).
    pub fn source_to_local(&self, sx: f64, sy: f64) -> (f64, f64) {
        let (sin, cos) = self.sin_cos();
        let dx = sx - self.offset_x;
        let dy = sy - self.offset_y;
        (dx * cos + dy * sin, -dx * sin + dy * cos)
    }

    /// Center of a cell in source pixels.
    pub fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        let half = self.cell_size / 2.0;
        self.local_to_source(col as f64 * self.cell_size + half, row as f64 * self.cell_size + half)
    }

    /// Corners of a cell in source pixels, clockwise from the top-left.
    pub fn cell_corners(&self, col: u32, row: u32) -> [(f64, f64); 4] {
        let x0 = col as f64 * self.cell_size;
        let y0 = row as f64 * self.cell_size;
        let x1 = x0 + self.cell_size;
        let y1 = y0 + self.cell_size;
        [
            self.local_to_source(x0, y0),
            self.local_to_source(x1, y0),
            self.local_to_source(x1, y1),
            self.local_to_source(x0, y1),
        ]
    }

    /// The grid cell (if any) under a source pixel position.
    pub fn cell_at(&self, sx: f64, sy: f64) -> Option<(u32, u32)> {
        let (lx, ly) = self.source_to_local(sx, sy);
        if lx < 0.0 || ly < 0.0 || self.cell_size <= 0.0 {
            return None;
        }
        let col = (lx / self.cell_size).floor() as u32;
        let row = (ly / self.cell_size).floor() as u32;
        (col < self.cols && row < self.rows).then_some((col, row))
    }

    /// Drag the overlay by a source-pixel delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Scale the cell size by `factor` keeping the source point
    /// `(anchor_x, anchor_y)` fixed under the overlay.
    pub fn zoom_about(&mut self, factor: f64, anchor_x: f64, anchor_y: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let new_size = (self.cell_size * factor).max(MIN_CELL_SIZE);
        let applied = new_size / self.cell_size;
        self.offset_x = anchor_x + (self.offset_x - anchor_x) * applied;
        self.offset_y = anchor_y + (self.offset_y - anchor_y) * applied;
        self.cell_size = new_size;
    }

    pub fn set_cell_size(&mut self, size: f64) {
        if size.is_finite() {
            self.cell_size = size.max(MIN_CELL_SIZE);
        }
    }

    /// Set the rotation, normalized to `(-180, 180]`.
    pub fn set_rotation(&mut self, degrees: f64) {
        if !degrees.is_finite() {
            return;
        }
        let mut d = degrees % 360.0;
        if d <= -180.0 {
            d += 360.0;
        } else if d > 180.0 {
            d -= 360.0;
        }
        self.rotation_degrees = d;
    }

    /// Choose `cols`/`rows` so the grid covers the image as far as whole
    /// cells reach from the current origin.
    pub fn fit_to_image(&mut self, width: u32, height: u32) {
        if self.cell_size <= 0.0 {
            return;
        }
        let corners = [
            (0.0, 0.0),
            (width as f64, 0.0),
            (width as f64, height as f64),
            (0.0, height as f64),
        ];
        let (mut max_lx, mut max_ly) = (0.0_f64, 0.0_f64);
        for (sx, sy) in corners {
            let (lx, ly) = self.source_to_local(sx, sy);
            max_lx = max_lx.max(lx);
            max_ly = max_ly.max(ly);
        }
        self.cols = ((max_lx / self.cell_size).floor() as u32).max(1);
        self.rows = ((max_ly / self.cell_size).floor() as u32).max(1);
    }
}

/// One voting bucket: quantized key plus the raw samples that fell into it.
struct Bucket {
    key: (u8, u8, u8),
    members: Vec<Rgb>,
}

fn bucket_channel(c: u8) -> u8 {
    // 255 / 32 rounds to 8 → 256, which saturates to 255; still a unique key.
    ((c as f64 / BUCKET_STEP).round() * BUCKET_STEP).min(255.0) as u8
}

/// Consensus color of one cell, or `None` when no sample landed on an opaque
/// pixel inside the image.
pub fn sample_cell(
    src: &SourceImage,
    calib: &Calibration,
    col: u32,
    row: u32,
    alpha_threshold: u8,
) -> Option<Rgb> {
    let size = calib.cell_size;
    let cx = col as f64 * size + size / 2.0;
    let cy = row as f64 * size + size / 2.0;

    let mut buckets: Vec<Bucket> = Vec::with_capacity(9);
    for ox in SAMPLE_OFFSETS {
        for oy in SAMPLE_OFFSETS {
            let (sx, sy) = calib.local_to_source(cx + ox * size, cy + oy * size);
            let Some(px) = src.pixel(sx.floor() as i64, sy.floor() as i64) else {
                continue;
            };
            if px[3] < alpha_threshold {
                continue;
            }
            let rgb = Rgb::new(px[0], px[1], px[2]);
            let key = (bucket_channel(rgb.r), bucket_channel(rgb.g), bucket_channel(rgb.b));
            match buckets.iter_mut().find(|b| b.key == key) {
                Some(bucket) => bucket.members.push(rgb),
                None => buckets.push(Bucket { key, members: vec![rgb] }),
            }
        }
    }

    // Largest bucket wins; on equal size the earliest-created bucket stays.
    let mut winner: Option<&Bucket> = None;
    for bucket in &buckets {
        if winner.map_or(true, |w| bucket.members.len() > w.members.len()) {
            winner = Some(bucket);
        }
    }
    let winner = winner?;

    let n = winner.members.len() as f64;
    let (mut r, mut g, mut b) = (0.0, 0.0, 0.0);
    for m in &winner.members {
        r += m.r as f64;
        g += m.g as f64;
        b += m.b as f64;
    }
    Some(Rgb::new(
        (r / n).round() as u8,
        (g / n).round() as u8,
        (b / n).round() as u8,
    ))
}

/// Classify every cell of the calibrated grid.  Cells with no usable sample
/// are left empty.
pub fn sample_pattern(
    src: &SourceImage,
    calib: &Calibration,
    palette: &Palette,
    alpha_threshold: u8,
) -> BeadGrid {
    let start = Instant::now();
    let mut grid = BeadGrid::new();
    for row in 0..calib.rows {
        for col in 0..calib.cols {
            if let Some(rgb) = sample_cell(src, calib, col, row, alpha_threshold) {
                grid.set(Cell::new(col as i32, row as i32), palette.nearest(rgb).id());
            }
        }
    }
    crate::log_info!(
        "Sampled {}x{} pattern grid ({} beads, cell {:.1}px, {:.1}°) in {:.0}ms",
        calib.cols,
        calib.rows,
        grid.len(),
        calib.cell_size,
        calib.rotation_degrees,
        start.elapsed().as_secs_f64() * 1000.0
    );
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::test_util::solid;
    use crate::palette::PaletteColor;
    use image::{Rgba, RgbaImage};

    fn palette() -> Palette {
        Palette::new(
            "p",
            vec![
                PaletteColor::from_rgb("red", Rgb::new(255, 0, 0), "T", "R"),
                PaletteColor::from_rgb("blue", Rgb::new(0, 0, 255), "T", "B"),
                PaletteColor::from_rgb("white", Rgb::new(255, 255, 255), "T", "W"),
            ],
        )
        .unwrap()
    }

    fn calib(cols: u32, rows: u32, size: f64) -> Calibration {
        Calibration { cell_size: size, cols, rows, ..Calibration::default() }
    }

    /// Checkerboard of red/blue squares of `size` pixels.
    fn checker(cols: u32, rows: u32, size: u32) -> SourceImage {
        let img = RgbaImage::from_fn(cols * size, rows * size, |x, y| {
            if ((x / size) + (y / size)) % 2 == 0 {
                Rgba([250, 10, 10, 255])
            } else {
                Rgba([10, 10, 240, 255])
            }
        });
        SourceImage::from_image(img)
    }

    #[test]
    fn aligned_grid_reads_checkerboard() {
        let src = checker(4, 3, 10);
        let grid = sample_pattern(&src, &calib(4, 3, 10.0), &palette(), 128);
        assert_eq!(grid.len(), 12);
        assert_eq!(grid.get(Cell::new(0, 0)).map(String::as_str), Some("red"));
        assert_eq!(grid.get(Cell::new(1, 0)).map(String::as_str), Some("blue"));
        assert_eq!(grid.get(Cell::new(3, 2)).map(String::as_str), Some("blue"));
    }

    #[test]
    fn offset_grid_reads_shifted_image() {
        // Image has a 7px margin before the pattern starts.
        let pattern = checker(2, 2, 10);
        let mut img = RgbaImage::from_pixel(27, 27, Rgba([255, 255, 255, 255]));
        image::imageops::replace(&mut img, pattern.as_image(), 7, 7);
        let src = SourceImage::from_image(img);
        let c = Calibration { offset_x: 7.0, offset_y: 7.0, ..calib(2, 2, 10.0) };
        let grid = sample_pattern(&src, &c, &palette(), 128);
        assert_eq!(grid.get(Cell::new(0, 0)).map(String::as_str), Some("red"));
        assert_eq!(grid.get(Cell::new(1, 1)).map(String::as_str), Some("red"));
        assert_eq!(grid.get(Cell::new(0, 1)).map(String::as_str), Some("blue"));
    }

    #[test]
    fn cells_off_the_image_stay_empty() {
        let src = solid(10, 10, [255, 0, 0, 255]);
        let grid = sample_pattern(&src, &calib(3, 1, 10.0), &palette(), 128);
        assert_eq!(grid.len(), 1);
        assert!(grid.get(Cell::new(1, 0)).is_none());
    }

    #[test]
    fn transparent_cells_stay_empty() {
        let src = solid(10, 10, [255, 0, 0, 100]);
        let grid = sample_pattern(&src, &calib(1, 1, 10.0), &palette(), 128);
        assert!(grid.is_empty());
    }

    #[test]
    fn majority_bucket_beats_outliers() {
        // 30x30 cell that is blue except a red stripe covering one sample column.
        let img = RgbaImage::from_fn(30, 30, |x, _| {
            if x < 10 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
        });
        let src = SourceImage::from_image(img);
        let rgb = sample_cell(&src, &calib(1, 1, 30.0), 0, 0, 128).unwrap();
        assert_eq!(rgb, Rgb::new(0, 0, 255));
    }

    #[test]
    fn winning_bucket_averages_raw_samples() {
        // Left two sample columns (x = 6, 15) see 100, right column (x = 24) sees 110;
        // both fall in bucket 96, so all nine samples average to 103.33 → 103.
        let img = RgbaImage::from_fn(30, 30, |x, _| {
            if x < 20 { Rgba([100, 100, 100, 255]) } else { Rgba([110, 110, 110, 255]) }
        });
        let src = SourceImage::from_image(img);
        let rgb = sample_cell(&src, &calib(1, 1, 30.0), 0, 0, 128).unwrap();
        assert_eq!(rgb, Rgb::new(103, 103, 103));
    }

    #[test]
    fn tie_goes_to_first_sampled_bucket() {
        // Top sample row red, bottom row blue, middle row transparent: 3 vs 3.
        let img = RgbaImage::from_fn(30, 30, |_, y| {
            if y < 10 {
                Rgba([255, 0, 0, 255])
            } else if y < 20 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let src = SourceImage::from_image(img);
        let rgb = sample_cell(&src, &calib(1, 1, 30.0), 0, 0, 128).unwrap();
        assert_eq!(rgb, Rgb::new(255, 0, 0));
    }

    #[test]
    fn rotation_moves_cell_centers() {
        let c = Calibration {
            offset_x: 50.0,
            offset_y: 50.0,
            rotation_degrees: 90.0,
            ..calib(2, 2, 10.0)
        };
        let (x, y) = c.cell_center(0, 0);
        assert!((x - 45.0).abs() < 1e-9 && (y - 55.0).abs() < 1e-9, "got {x},{y}");
        let (lx, ly) = c.source_to_local(x, y);
        assert!((lx - 5.0).abs() < 1e-9 && (ly - 5.0).abs() < 1e-9);
        assert_eq!(c.cell_at(x, y), Some((0, 0)));
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut c = Calibration { offset_x: 10.0, offset_y: 20.0, ..calib(5, 5, 8.0) };
        let anchor = (30.0, 44.0);
        let before = c.source_to_local(anchor.0, anchor.1);
        c.zoom_about(1.5, anchor.0, anchor.1);
        let after = c.source_to_local(anchor.0, anchor.1);
        assert!((c.cell_size - 12.0).abs() < 1e-9);
        // Same fractional position within the grid.
        assert!((after.0 / 12.0 - before.0 / 8.0).abs() < 1e-9);
        assert!((after.1 / 12.0 - before.1 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn cell_size_never_drops_below_one_pixel() {
        let mut c = calib(1, 1, 2.0);
        c.zoom_about(0.01, 0.0, 0.0);
        assert_eq!(c.cell_size, MIN_CELL_SIZE);
        c.set_cell_size(-4.0);
        assert_eq!(c.cell_size, MIN_CELL_SIZE);
    }

    #[test]
    fn rotation_is_normalized() {
        let mut c = Calibration::default();
        c.set_rotation(270.0);
        assert_eq!(c.rotation_degrees, -90.0);
        c.set_rotation(-180.0);
        assert_eq!(c.rotation_degrees, 180.0);
        c.set_rotation(725.0);
        assert!((c.rotation_degrees - 5.0).abs() < 1e-9);
    }

    #[test]
    fn fit_counts_whole_cells() {
        let mut c = Calibration { offset_x: 5.0, offset_y: 0.0, ..calib(1, 1, 10.0) };
        c.fit_to_image(100, 64);
        assert_eq!((c.cols, c.rows), (9, 6));
    }
}
