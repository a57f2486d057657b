// ============================================================================
// COLOR SPACE — sRGB → CIE L*a*b* (D65) and CIE76 distance
// ============================================================================

use std::fmt;

/// D65 reference white, scaled so that Y = 100.
const WHITE_X: f64 = 95.047;
const WHITE_Y: f64 = 100.0;
const WHITE_Z: f64 = 108.883;

/// An 8-bit sRGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` or `RRGGBB` (case-insensitive).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// `#RRGGBB`, upper case.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_lab(self) -> Lab {
        rgb_to_lab(self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A CIE L*a*b* color relative to the D65 white point.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    pub fn delta_e(&self, other: &Lab) -> f64 {
        delta_e(self, other)
    }
}

/// Inverse sRGB companding for a channel already normalised to `[0, 1]`.
#[inline]
fn srgb_to_linear(v: f64) -> f64 {
    if v > 0.04045 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

/// Convert an 8-bit sRGB triple to L*a*b*.
pub fn rgb_to_lab(r: u8, g: u8, b: u8) -> Lab {
    let r = srgb_to_linear(r as f64 / 255.0) * 100.0;
    let g = srgb_to_linear(g as f64 / 255.0) * 100.0;
    let b = srgb_to_linear(b as f64 / 255.0) * 100.0;

    // sRGB → XYZ (D65)
    let x = r * 0.4124 + g * 0.3576 + b * 0.1805;
    let y = r * 0.2126 + g * 0.7152 + b * 0.0722;
    let z = r * 0.0193 + g * 0.1192 + b * 0.9505;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// CIE76 color difference: plain Euclidean distance in Lab.
pub fn delta_e(lab1: &Lab, lab2: &Lab) -> f64 {
    let dl = lab1.l - lab2.l;
    let da = lab1.a - lab2.a;
    let db = lab1.b - lab2.b;
    (dl * dl + da * da + db * db).sqrt()
}
