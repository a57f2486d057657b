// ============================================================================
// GRID OPERATIONS — image conversion pipelines and whole-grid transforms
// ============================================================================

pub mod denoise;
pub mod palette_convert;
pub mod pattern_sampler;
pub mod rasterize;

use image::{Rgba, RgbaImage};

/// Decoded RGBA source image handed over by the image loader.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    /// Wrap a raw RGBA buffer; fails on a zero-sized image or when the
    /// buffer length does not match `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ConvertError> {
        if width == 0 || height == 0 {
            return Err(ConvertError::EmptyImage);
        }
        let expected = width as usize * height as usize * 4;
        let actual = pixels.len();
        if expected != actual {
            return Err(ConvertError::BufferSize { expected, actual });
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(|pixels| Self { pixels })
            .ok_or(ConvertError::BufferSize { expected, actual })
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Pixel at integer coordinates, `None` outside the image.
    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgba<u8>> {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return None;
        }
        Some(*self.pixels.get_pixel(x as u32, y as u32))
    }
}

/// Error type for the image → grid pipelines.
#[derive(Debug)]
pub enum ConvertError {
    BufferSize { expected: usize, actual: usize },
    EmptyImage,
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvertError::BufferSize { expected, actual } => {
                write!(f, "pixel buffer has {} bytes, expected {}", actual, expected)
            }
            ConvertError::EmptyImage => write!(f, "source image has no pixels"),
        }
    }
}

impl std::error::Error for ConvertError {}
