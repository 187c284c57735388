//! Encoding decoded pages back to bytes

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError};
use serde::{Deserialize, Serialize};

use crate::reader::DecodedImage;

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Encode `image`. `quality` only applies to JPEG and is clamped to 1..=100.
pub fn encode(image: &DecodedImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(image.image().to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)?;
        }
        OutputFormat::Png => {
            image
                .image()
                .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn sample() -> DecodedImage {
        DecodedImage::from_image(DynamicImage::ImageRgba8(ImageBuffer::from_fn(32, 16, |x, y| {
            Rgba([(x * 8) as u8, (y * 16) as u8, 128, 255])
        })))
    }

    #[test]
    fn test_encode_jpeg_header() {
        let bytes = encode(&sample(), OutputFormat::Jpeg, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_png_keeps_dimensions() {
        let bytes = encode(&sample(), OutputFormat::Png, 0).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let high = encode(&sample(), OutputFormat::Jpeg, 95).unwrap();
        let low = encode(&sample(), OutputFormat::Jpeg, 10).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_extension("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_extension("png"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_extension("gif"), None);
        assert_eq!(OutputFormat::default().extension(), "jpg");
    }
}
