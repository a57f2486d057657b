use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canvas::{BeadGrid, Bounds, Cell, GridMode};
use crate::ops::SourceImage;
use crate::palette::{ColorId, Palette};

// ============================================================================
// SOURCE IMAGES
// ============================================================================

/// Decode any raster format supported by the `image` crate into RGBA.
pub fn load_source_image(path: &Path) -> Result<SourceImage, String> {
    let img = image::open(path).map_err(|e| e.to_string())?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(format!("{} has no pixels", path.display()));
    }
    Ok(SourceImage::from_image(img))
}

// ============================================================================
// DRAFT FILE FORMAT
// ============================================================================

/// Magic header for draft files.
const DRAFT_MAGIC: &str = "BFD1";

/// Longest edge of the preview image embedded in a draft.
pub const THUMBNAIL_MAX_EDGE: u32 = 256;

/// Largest one-pixel-per-bead preview that will be rendered in full.
const MAX_PREVIEW_PIXELS: u64 = 64 * 1024 * 1024;

/// Serializable editor draft.  Grid keys are `"x,y"` strings; `width` and
/// `height` are the bounds extent at save time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DraftRecord {
    magic: String,
    pub id: String,
    pub title: String,
    pub grid: BTreeMap<String, ColorId>,
    pub width: u32,
    pub height: u32,
    pub min_x: i32,
    pub min_y: i32,
    pub is_free_mode: bool,
    pub offset_x: f32,
    pub offset_y: f32,
    pub zoom: f32,
    /// Seconds since the Unix epoch.
    pub last_modified: u64,
    /// PNG-encoded preview, empty when none was rendered.
    pub thumbnail: Vec<u8>,
}

impl DraftRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        title: String,
        grid: &BeadGrid,
        bounds: &Bounds,
        offset: (f32, f32),
        zoom: f32,
        last_modified: u64,
        thumbnail: Vec<u8>,
    ) -> Self {
        Self {
            magic: DRAFT_MAGIC.to_string(),
            id,
            title,
            grid: grid_to_keys(grid),
            width: bounds.width(),
            height: bounds.height(),
            min_x: bounds.min_x,
            min_y: bounds.min_y,
            is_free_mode: bounds.is_free(),
            offset_x: offset.0,
            offset_y: offset.1,
            zoom,
            last_modified,
            thumbnail,
        }
    }

    /// Rebuild the bounds described by the record.
    pub fn bounds(&self) -> Option<Bounds> {
        let mode = if self.is_free_mode { GridMode::Free } else { GridMode::Fixed };
        let max_x = i32::try_from(i64::from(self.min_x) + i64::from(self.width)).ok()?;
        let max_y = i32::try_from(i64::from(self.min_y) + i64::from(self.height)).ok()?;
        Bounds::from_extents(self.min_x, max_x, self.min_y, max_y, mode)
    }

    /// Decode the `"x,y"` keyed grid.  Malformed keys are logged and skipped.
    pub fn decode_grid(&self) -> BeadGrid {
        keys_to_grid(&self.grid)
    }
}

pub fn cell_key(cell: Cell) -> String {
    format!("{},{}", cell.x, cell.y)
}

pub fn parse_cell_key(key: &str) -> Option<Cell> {
    let (x, y) = key.split_once(',')?;
    Some(Cell::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

pub fn grid_to_keys(grid: &BeadGrid) -> BTreeMap<String, ColorId> {
    grid.iter().map(|(&c, id)| (cell_key(c), id.clone())).collect()
}

pub fn keys_to_grid(keys: &BTreeMap<String, ColorId>) -> BeadGrid {
    let mut grid = BeadGrid::new();
    let mut skipped = 0usize;
    for (key, id) in keys {
        match parse_cell_key(key) {
            Some(cell) => grid.set(cell, id.clone()),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        crate::log_warn!("Draft grid: skipped {} malformed cell keys", skipped);
    }
    grid
}

/// Error type for draft file operations
#[derive(Debug)]
pub enum DraftError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for DraftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DraftError::Io(e) => write!(f, "I/O error: {}", e),
            DraftError::Serialize(e) => write!(f, "Serialization error: {}", e),
            DraftError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for DraftError {}

impl From<std::io::Error> for DraftError {
    fn from(e: std::io::Error) -> Self {
        DraftError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for DraftError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DraftError::Serialize(e.to_string())
    }
}

pub fn save_draft(draft: &DraftRecord, path: &Path) -> Result<(), DraftError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, draft)?;
    Ok(())
}

pub fn load_draft(path: &Path) -> Result<DraftRecord, DraftError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(DraftError::InvalidFormat("File too small".into()));
    }

    // bincode writes a String as an 8-byte length prefix plus UTF-8 data,
    // so the 4-byte magic sits at bytes 8..12.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != DRAFT_MAGIC {
        return Err(DraftError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }

    let draft: DraftRecord = bincode::deserialize(&raw)?;
    if draft.width == 0 || draft.height == 0 {
        return Err(DraftError::InvalidFormat("Draft dimensions cannot be zero".into()));
    }
    if draft.bounds().is_none() {
        return Err(DraftError::InvalidFormat("Draft bounds overflow".into()));
    }
    Ok(draft)
}

// ============================================================================
// EXPORT
// ============================================================================

/// Pattern handed to an external sheet renderer, with coordinates shifted so
/// the top-left cell is `(0, 0)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSheet {
    pub title: String,
    pub grid: BeadGrid,
    pub width: u32,
    pub height: u32,
}

impl ExportSheet {
    /// Fixed canvases export their whole bounds; free canvases are cropped to
    /// the occupied cells.
    pub fn new(title: impl Into<String>, grid: &BeadGrid, bounds: &Bounds) -> Self {
        let title = title.into();
        let extent = if bounds.is_free() { grid.occupied_extent() } else { None };
        match extent {
            Some((min, max)) => Self {
                title,
                grid: grid.rebased(min),
                width: span(min.x, max.x),
                height: span(min.y, max.y),
            },
            None => Self {
                title,
                grid: grid.rebased(Cell::new(bounds.min_x, bounds.min_y)),
                width: bounds.width(),
                height: bounds.height(),
            },
        }
    }

    /// One pixel per bead; empty cells and ids unknown to `palette` stay
    /// transparent.
    pub fn to_image(&self, palette: &Palette) -> RgbaImage {
        let mut img = RgbaImage::new(self.width.max(1), self.height.max(1));
        for (cell, id) in &self.grid {
            if cell.x < 0 || cell.y < 0 {
                continue;
            }
            let (x, y) = (cell.x as u32, cell.y as u32);
            if x >= img.width() || y >= img.height() {
                continue;
            }
            if let Some(color) = palette.get(id) {
                let rgb = color.rgb();
                img.put_pixel(x, y, Rgba([rgb.r, rgb.g, rgb.b, 255]));
            }
        }
        img
    }

    /// Downscaled preview whose longer edge is at most `max_edge` pixels.
    /// Each pixel shows one bead of the block it covers, so memory stays
    /// bounded however far apart the beads are.
    pub fn to_thumbnail(&self, palette: &Palette, max_edge: u32) -> RgbaImage {
        let max_edge = max_edge.max(1);
        let longest = self.width.max(self.height).max(1);
        let scale = longest.div_ceil(max_edge);
        let mut img = RgbaImage::new(
            self.width.max(1).div_ceil(scale),
            self.height.max(1).div_ceil(scale),
        );
        for (cell, id) in &self.grid {
            let (Ok(x), Ok(y)) = (u32::try_from(cell.x), u32::try_from(cell.y)) else {
                continue;
            };
            let (x, y) = (x / scale, y / scale);
            if x >= img.width() || y >= img.height() {
                continue;
            }
            if let Some(color) = palette.get(id) {
                let rgb = color.rgb();
                img.put_pixel(x, y, Rgba([rgb.r, rgb.g, rgb.b, 255]));
            }
        }
        img
    }

    /// Write the full-size preview.  Sheets too large to render in memory
    /// are refused.
    pub fn save_preview(&self, palette: &Palette, path: &Path) -> Result<(), String> {
        let pixels = u64::from(self.width) * u64::from(self.height);
        if pixels > MAX_PREVIEW_PIXELS {
            return Err(format!(
                "preview of {}x{} beads is too large to render",
                self.width, self.height
            ));
        }
        self.to_image(palette)
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| e.to_string())
    }
}

/// Cells in the inclusive range `min..=max`.
fn span(min: i32, max: i32) -> u32 {
    u32::try_from(i64::from(max) - i64::from(min) + 1).unwrap_or(u32::MAX)
}

/// Encode an image as PNG bytes (draft thumbnails).
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgba8)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::palette::PaletteColor;

    fn sample_draft(bounds: &Bounds) -> DraftRecord {
        let mut g = BeadGrid::new();
        g.set(Cell::new(-3, 4), "red");
        g.set(Cell::new(10, 0), "blue");
        DraftRecord::new(
            "id-1".into(),
            "Heart".into(),
            &g,
            bounds,
            (12.5, -4.0),
            16.0,
            1_700_000_000,
            Vec::new(),
        )
    }

    #[test]
    fn cell_keys_parse_back() {
        assert_eq!(cell_key(Cell::new(-3, 17)), "-3,17");
        assert_eq!(parse_cell_key("-3,17"), Some(Cell::new(-3, 17)));
        assert_eq!(parse_cell_key(" 4 , 5 "), Some(Cell::new(4, 5)));
        assert_eq!(parse_cell_key("4;5"), None);
        assert_eq!(parse_cell_key("a,5"), None);
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let mut keys = BTreeMap::new();
        keys.insert("1,2".to_string(), "red".to_string());
        keys.insert("oops".to_string(), "blue".to_string());
        let g = keys_to_grid(&keys);
        assert_eq!(g.len(), 1);
        assert_eq!(g.get(Cell::new(1, 2)).map(String::as_str), Some("red"));
    }

    #[test]
    fn draft_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heart.bfd");
        let bounds = Bounds::from_extents(-20, 120, 0, 100, GridMode::Free).unwrap();
        let draft = sample_draft(&bounds);
        save_draft(&draft, &path).unwrap();

        let loaded = load_draft(&path).unwrap();
        assert_eq!(loaded, draft);
        assert_eq!((loaded.width, loaded.height), (140, 100));
        assert_eq!(loaded.bounds(), Some(bounds));
        assert_eq!(loaded.decode_grid().get(Cell::new(-3, 4)).map(String::as_str), Some("red"));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bfd");
        std::fs::write(&path, b"\x04\0\0\0\0\0\0\0PFE1junkjunkjunk").unwrap();
        assert!(matches!(load_draft(&path), Err(DraftError::InvalidFormat(_))));

        std::fs::write(&path, b"tiny").unwrap();
        assert!(matches!(load_draft(&path), Err(DraftError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_draft_is_a_serialize_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.bfd");
        let draft = sample_draft(&Bounds::fixed(20, 20));
        let bytes = bincode::serialize(&draft).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(load_draft(&path), Err(DraftError::Serialize(_))));
    }

    #[test]
    fn free_export_is_cropped_and_normalized() {
        let bounds = Bounds::from_extents(-20, 120, -20, 100, GridMode::Free).unwrap();
        let mut g = BeadGrid::new();
        g.set(Cell::new(-5, -2), "red");
        g.set(Cell::new(3, 6), "blue");
        let sheet = ExportSheet::new("T", &g, &bounds);
        assert_eq!((sheet.width, sheet.height), (9, 9));
        assert_eq!(sheet.grid.get(Cell::new(0, 0)).map(String::as_str), Some("red"));
        assert_eq!(sheet.grid.get(Cell::new(8, 8)).map(String::as_str), Some("blue"));
    }

    #[test]
    fn fixed_export_keeps_full_canvas() {
        let bounds = Bounds::fixed(10, 8);
        let mut g = BeadGrid::new();
        g.set(Cell::new(4, 4), "red");
        let sheet = ExportSheet::new("T", &g, &bounds);
        assert_eq!((sheet.width, sheet.height), (10, 8));
        assert_eq!(sheet.grid.get(Cell::new(4, 4)).map(String::as_str), Some("red"));
    }

    #[test]
    fn wide_free_draft_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.bfd");
        let bounds = Bounds::from_extents(-20, 70_020, -20, 100, GridMode::Free).unwrap();
        let mut g = BeadGrid::new();
        g.set(Cell::new(70_000, 0), "red");
        g.set(Cell::new(70_001, 0), "blue");
        let draft = DraftRecord::new("id".into(), "Wide".into(), &g, &bounds, (0.0, 0.0), 12.0, 0, Vec::new());
        save_draft(&draft, &path).unwrap();

        let loaded = load_draft(&path).unwrap();
        assert_eq!(loaded.bounds(), Some(bounds));
        assert_eq!(loaded.decode_grid(), g);
    }

    #[test]
    fn thumbnail_of_sparse_huge_sheet_stays_small() {
        let palette = Palette::new(
            "p",
            vec![PaletteColor::from_rgb("red", Rgb::new(200, 10, 20), "T", "R")],
        )
        .unwrap();
        let mut g = BeadGrid::new();
        g.set(Cell::new(0, 0), "red");
        g.set(Cell::new(60_000, 60_000), "red");
        let sheet = ExportSheet::new("T", &g, &Bounds::free(10, 10));
        assert_eq!((sheet.width, sheet.height), (60_001, 60_001));

        let thumb = sheet.to_thumbnail(&palette, THUMBNAIL_MAX_EDGE);
        assert!(thumb.width() <= THUMBNAIL_MAX_EDGE && thumb.height() <= THUMBNAIL_MAX_EDGE);
        assert_eq!(*thumb.get_pixel(0, 0), Rgba([200, 10, 20, 255]));
        let (w, h) = thumb.dimensions();
        assert_eq!(thumb.get_pixel(w - 1, h - 1)[3], 255);

        let dir = tempfile::tempdir().unwrap();
        assert!(sheet.save_preview(&palette, &dir.path().join("huge.png")).is_err());
    }

    #[test]
    fn small_sheet_thumbnail_is_full_size() {
        let mut g = BeadGrid::new();
        g.set(Cell::new(1, 1), "red");
        let sheet = ExportSheet::new("T", &g, &Bounds::fixed(4, 3));
        let palette = Palette::builtin();
        assert_eq!(sheet.to_thumbnail(&palette, THUMBNAIL_MAX_EDGE).dimensions(), (4, 3));
    }

    #[test]
    fn preview_image_uses_palette_colors() {
        let palette = Palette::new(
            "p",
            vec![PaletteColor::from_rgb("red", Rgb::new(200, 10, 20), "T", "R")],
        )
        .unwrap();
        let mut g = BeadGrid::new();
        g.set(Cell::new(1, 0), "red");
        g.set(Cell::new(0, 1), "unknown");
        let sheet = ExportSheet::new("T", &g, &Bounds::fixed(2, 2));
        let img = sheet.to_image(&palette);
        assert_eq!(*img.get_pixel(1, 0), Rgba([200, 10, 20, 255]));
        assert_eq!(img.get_pixel(0, 1)[3], 0);
        assert_eq!(img.get_pixel(0, 0)[3], 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.png");
        sheet.save_preview(&palette, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (2, 2));
        assert!(!encode_png(&img).unwrap().is_empty());
    }
}
