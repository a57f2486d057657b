// ============================================================================
// PALETTE — bead color sets and nearest-color matching
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::color::{Lab, Rgb, delta_e};

/// Identifier of a palette color as stored in a grid cell.
pub type ColorId = String;

/// Palette color as supplied by a palette loader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteRecord {
    pub id: String,
    /// `#RRGGBB`
    pub hex: String,
    pub brand: String,
    pub code: String,
}

/// One bead color with its Lab value computed once at load time.
#[derive(Clone, Debug, PartialEq)]
pub struct PaletteColor {
    id: ColorId,
    hex: String,
    brand: String,
    code: String,
    rgb: Rgb,
    lab: Lab,
}

impl PaletteColor {
    pub fn from_record(record: PaletteRecord) -> Result<Self, PaletteError> {
        let rgb = Rgb::from_hex(&record.hex)
            .ok_or_else(|| PaletteError::InvalidHex(record.hex.clone()))?;
        Ok(Self::from_rgb(record.id, rgb, record.brand, record.code))
    }

    pub fn from_rgb(
        id: impl Into<String>,
        rgb: Rgb,
        brand: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            hex: rgb.to_hex(),
            brand: brand.into(),
            code: code.into(),
            rgb,
            lab: rgb.to_lab(),
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn hex(&self) -> &str { &self.hex }
    pub fn brand(&self) -> &str { &self.brand }
    pub fn code(&self) -> &str { &self.code }
    pub fn rgb(&self) -> Rgb { self.rgb }
    pub fn lab(&self) -> &Lab { &self.lab }

    pub fn to_record(&self) -> PaletteRecord {
        PaletteRecord {
            id: self.id.clone(),
            hex: self.hex.clone(),
            brand: self.brand.clone(),
            code: self.code.clone(),
        }
    }
}

/// Error type for palette construction and loading.
#[derive(Debug)]
pub enum PaletteError {
    /// No colors; nothing to match against.
    Empty,
    InvalidHex(String),
    Parse { line: usize, reason: String },
    Io(std::io::Error),
}

impl std::fmt::Display for PaletteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaletteError::Empty => write!(f, "palette has no colors"),
            PaletteError::InvalidHex(h) => write!(f, "invalid hex color '{}'", h),
            PaletteError::Parse { line, reason } => write!(f, "line {}: {}", line, reason),
            PaletteError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PaletteError {}

impl From<std::io::Error> for PaletteError {
    fn from(e: std::io::Error) -> Self {
        PaletteError::Io(e)
    }
}

/// An ordered, non-empty set of bead colors.
///
/// Order matters: when two colors are equally close to a probe, the one that
/// comes first wins.
#[derive(Clone, Debug)]
pub struct Palette {
    name: String,
    colors: Vec<PaletteColor>,
    by_id: HashMap<ColorId, usize>,
}

impl Palette {
    /// Build a palette from already-validated colors.  Duplicate ids keep the
    /// first occurrence.
    pub fn new(name: impl Into<String>, colors: Vec<PaletteColor>) -> Result<Self, PaletteError> {
        let name = name.into();
        let mut kept = Vec::with_capacity(colors.len());
        let mut by_id = HashMap::with_capacity(colors.len());
        for color in colors {
            if by_id.contains_key(color.id()) {
                crate::log_warn!("Palette '{}': duplicate color id '{}' dropped", name, color.id());
                continue;
            }
            by_id.insert(color.id.clone(), kept.len());
            kept.push(color);
        }
        if kept.is_empty() {
            return Err(PaletteError::Empty);
        }
        Ok(Self { name, colors: kept, by_id })
    }

    pub fn from_records(
        name: impl Into<String>,
        records: Vec<PaletteRecord>,
    ) -> Result<Self, PaletteError> {
        let colors = records
            .into_iter()
            .map(PaletteColor::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, colors)
    }

    /// Parse palette text: one `id,hex,brand,code` record per line.
    /// Blank lines and lines starting with `;` are ignored; malformed lines
    /// are logged and skipped.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, PaletteError> {
        let name = name.into();
        let mut colors = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            match parse_line(line) {
                Ok(color) => colors.push(color),
                Err(reason) => {
                    crate::log_warn!("Palette '{}' line {}: {}, skipped", name, idx + 1, reason);
                }
            }
        }
        Self::new(name, colors)
    }

    pub fn load(path: &Path) -> Result<Self, PaletteError> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Palette".to_string());
        Self::parse(name, &text)
    }

    /// Small generic palette used when no palette file is supplied.
    pub fn builtin() -> Self {
        let colors: Vec<PaletteColor> = BUILTIN_COLORS
            .iter()
            .map(|&(code, rgb)| {
                PaletteColor::from_rgb(format!("generic-{}", code), rgb, "Generic", code)
            })
            .collect();
        let by_id = colors
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self { name: "Generic".to_string(), colors, by_id }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn len(&self) -> usize { self.colors.len() }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool { self.colors.is_empty() }

    pub fn colors(&self) -> &[PaletteColor] { &self.colors }

    pub fn get(&self, id: &str) -> Option<&PaletteColor> {
        self.by_id.get(id).map(|&i| &self.colors[i])
    }

    /// Palette position of `id`, used to order legends.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn lab_of(&self, id: &str) -> Option<&Lab> {
        self.get(id).map(|c| c.lab())
    }

    /// Closest palette color to an sRGB value.
    pub fn nearest(&self, rgb: Rgb) -> &PaletteColor {
        self.nearest_lab(&rgb.to_lab())
    }

    /// Closest palette color to a Lab value.  Linear scan; ties go to the
    /// earlier palette entry.
    pub fn nearest_lab(&self, lab: &Lab) -> &PaletteColor {
        let mut best = &self.colors[0];
        let mut best_dist = delta_e(lab, best.lab());
        for color in &self.colors[1..] {
            let dist = delta_e(lab, color.lab());
            if dist < best_dist {
                best = color;
                best_dist = dist;
            }
        }
        best
    }
}

/// Free-function form of [`Palette::nearest`].
pub fn nearest_color<'p>(rgb: Rgb, palette: &'p Palette) -> &'p PaletteColor {
    palette.nearest(rgb)
}

fn parse_line(line: &str) -> Result<PaletteColor, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    }
    if fields[0].is_empty() {
        return Err("empty color id".to_string());
    }
    let rgb = Rgb::from_hex(fields[1]).ok_or_else(|| format!("invalid hex '{}'", fields[1]))?;
    Ok(PaletteColor::from_rgb(fields[0], rgb, fields[2], fields[3]))
}

const BUILTIN_COLORS: &[(&str, Rgb)] = &[
    ("01", Rgb::new(255, 255, 255)),
    ("02", Rgb::new(0, 0, 0)),
    ("03", Rgb::new(128, 128, 128)),
    ("04", Rgb::new(196, 196, 196)),
    ("05", Rgb::new(64, 64, 64)),
    ("06", Rgb::new(220, 30, 40)),
    ("07", Rgb::new(140, 20, 30)),
    ("08", Rgb::new(255, 140, 170)),
    ("09", Rgb::new(250, 130, 20)),
    ("10", Rgb::new(255, 220, 30)),
    ("11", Rgb::new(255, 240, 160)),
    ("12", Rgb::new(40, 170, 60)),
    ("13", Rgb::new(20, 90, 40)),
    ("14", Rgb::new(150, 220, 90)),
    ("15", Rgb::new(30, 90, 200)),
    ("16", Rgb::new(20, 40, 110)),
    ("17", Rgb::new(120, 190, 240)),
    ("18", Rgb::new(120, 60, 170)),
    ("19", Rgb::new(190, 150, 220)),
    ("20", Rgb::new(120, 70, 30)),
    ("21", Rgb::new(200, 150, 100)),
    ("22", Rgb::new(240, 200, 170)),
    ("23", Rgb::new(30, 170, 170)),
    ("24", Rgb::new(240, 230, 210)),
];
