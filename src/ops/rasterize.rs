// ============================================================================
// PHOTO RASTERIZER — downsample a photo and snap each cell to the palette
// ============================================================================

use image::imageops::{self, FilterType};
use std::collections::HashMap;
use std::time::Instant;

use crate::canvas::{BeadGrid, Cell};
use crate::color::Rgb;
use crate::ops::SourceImage;
use crate::palette::{ColorId, Palette};

/// How the photo is scaled down to the bead grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResampleFilter {
    /// Plain scaled blit.
    #[default]
    Nearest,
    /// Linear (triangle) filtering; softer edges on photos.
    Smooth,
}

impl ResampleFilter {
    pub fn label(&self) -> &'static str {
        match self {
            ResampleFilter::Nearest => "nearest",
            ResampleFilter::Smooth => "smooth",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Some(ResampleFilter::Nearest),
            "smooth" => Some(ResampleFilter::Smooth),
            _ => None,
        }
    }

    fn filter_type(self) -> FilterType {
        match self {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Smooth => FilterType::Triangle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterOptions {
    /// Pixels with alpha below this stay empty.
    pub alpha_threshold: u8,
    pub filter: ResampleFilter,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { alpha_threshold: 128, filter: ResampleFilter::Nearest }
    }
}

/// A converted pattern and its cell dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    pub grid: BeadGrid,
    pub width: u32,
    pub height: u32,
}

/// Output height for a photo scaled to `target_w` cells, preserving aspect.
pub fn target_height(src_w: u32, src_h: u32, target_w: u32) -> u32 {
    if src_w == 0 {
        return 1;
    }
    let h = (src_h as f64 * target_w as f64 / src_w as f64).round() as u32;
    h.max(1)
}

/// Downsample `src` to `target_w` cells wide and match every opaque cell to
/// the nearest palette color.  `target_w` is clamped to at least 1.
pub fn rasterize_photo(
    src: &SourceImage,
    target_w: u32,
    palette: &Palette,
    opts: &RasterOptions,
) -> Raster {
    let start = Instant::now();
    let target_w = target_w.max(1);
    let target_h = target_height(src.width(), src.height(), target_w);

    let mut grid = BeadGrid::new();
    if src.width() == 0 || src.height() == 0 {
        return Raster { grid, width: target_w, height: target_h };
    }

    let small = imageops::resize(src.as_image(), target_w, target_h, opts.filter.filter_type());

    // Photos repeat colors a lot once downsampled; match each distinct RGB once.
    let mut memo: HashMap<Rgb, ColorId> = HashMap::new();
    for (x, y, px) in small.enumerate_pixels() {
        if px[3] < opts.alpha_threshold {
            continue;
        }
        let rgb = Rgb::new(px[0], px[1], px[2]);
        let id = memo
            .entry(rgb)
            .or_insert_with(|| palette.nearest(rgb).id().to_string())
            .clone();
        grid.set(Cell::new(x as i32, y as i32), id);
    }

    crate::log_info!(
        "Rasterized {}x{} photo to {}x{} cells ({} beads, {} distinct inputs) in {:.0}ms",
        src.width(),
        src.height(),
        target_w,
        target_h,
        grid.len(),
        memo.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Raster { grid, width: target_w, height: target_h }
}
