//! Per-pixel and convolution filters for page images

use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::reader::DecodedImage;

const BRIGHTNESS_FACTOR: f32 = 1.2;
const CONTRAST_FACTOR: f32 = 1.3;

// Luminance weights used for desaturation
const LUMA_R: f32 = 0.213;
const LUMA_G: f32 = 0.715;
const LUMA_B: f32 = 0.072;

const SEPIA: ColorMatrix = ColorMatrix {
    rows: [
        [0.393, 0.769, 0.189, 0.0],
        [0.349, 0.686, 0.168, 0.0],
        [0.272, 0.534, 0.131, 0.0],
    ],
};

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Filters applicable to a decoded page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Brightness,
    Contrast,
    Grayscale,
    Sepia,
    Sharpen,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "brightness" => Some(Self::Brightness),
            "contrast" => Some(Self::Contrast),
            "grayscale" | "greyscale" => Some(Self::Grayscale),
            "sepia" => Some(Self::Sepia),
            "sharpen" => Some(Self::Sharpen),
            _ => None,
        }
    }
}

/// RGB rows of a 3x4 color matrix; the last column is an offset in 0..=255
#[derive(Debug, Clone, Copy)]
struct ColorMatrix {
    rows: [[f32; 4]; 3],
}

impl ColorMatrix {
    fn scale(factor: f32, offset: f32) -> Self {
        Self {
            rows: [
                [factor, 0.0, 0.0, offset],
                [0.0, factor, 0.0, offset],
                [0.0, 0.0, factor, offset],
            ],
        }
    }

    fn desaturate() -> Self {
        let row = [LUMA_R, LUMA_G, LUMA_B, 0.0];
        Self {
            rows: [row, row, row],
        }
    }

    fn apply(&self, px: Rgba<u8>) -> Rgba<u8> {
        let [r, g, b, a] = px.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let channel = |m: [f32; 4]| (m[0] * r + m[1] * g + m[2] * b + m[3]).round().clamp(0.0, 255.0) as u8;
        Rgba([
            channel(self.rows[0]),
            channel(self.rows[1]),
            channel(self.rows[2]),
            a,
        ])
    }
}

/// Apply `kind` and return a new image; the input is left untouched
pub fn apply_filter(image: &DecodedImage, kind: FilterKind) -> DecodedImage {
    let (source_width, source_height) = image.source_dimensions();
    let filtered = match kind {
        FilterKind::Brightness => color_transform(image.image(), ColorMatrix::scale(BRIGHTNESS_FACTOR, 0.0)),
        FilterKind::Contrast => {
            let translate = (-0.5 * CONTRAST_FACTOR + 0.5) * 255.0;
            color_transform(image.image(), ColorMatrix::scale(CONTRAST_FACTOR, translate))
        }
        FilterKind::Grayscale => color_transform(image.image(), ColorMatrix::desaturate()),
        FilterKind::Sepia => color_transform(image.image(), SEPIA),
        FilterKind::Sharpen => DynamicImage::ImageRgba8(image.image().to_rgba8()).filter3x3(&SHARPEN_KERNEL),
    };

    DecodedImage::new(filtered, source_width, source_height)
}

fn color_transform(image: &DynamicImage, matrix: ColorMatrix) -> DynamicImage {
    let mut out: RgbaImage = image.to_rgba8();
    for px in out.pixels_mut() {
        *px = matrix.apply(*px);
    }
    DynamicImage::ImageRgba8(out)
}
