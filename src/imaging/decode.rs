//! Budgeted image decoding
//!
//! JPEG goes through `jpeg-decoder` with DCT-domain scaling, so a
//! 1/2, 1/4 or 1/8 size buffer is produced directly. Everything else is
//! decoded by `image` under allocation limits and downsampled right away.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageReader, Limits, RgbImage};
use jpeg_decoder::{Decoder as JpegScaleDecoder, ImageInfo as JpegImageInfo, PixelFormat as JpegPixelFormat};
use thiserror::Error;

use super::downsample::{compute_downsample_factor, fit_within};
use crate::reader::{DecodedImage, RenderTarget};

/// Formats accepted as page images
const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Gif,
];

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("unrecognized image data")]
    Unrecognized,

    #[error("unsupported image format: {0:?}")]
    Unsupported(ImageFormat),

    #[error("image too large: {width}x{height}")]
    TooLarge { width: u32, height: u32 },

    #[error("malformed image: {0}")]
    Malformed(String),
}

impl From<image::ImageError> for ImageDecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(_) => ImageDecodeError::TooLarge {
                width: 0,
                height: 0,
            },
            other => ImageDecodeError::Malformed(other.to_string()),
        }
    }
}

/// Guards applied to every decode
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_alloc: u64,
    pub max_dimension: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_alloc: 512 * 1024 * 1024,
            max_dimension: 32_768,
        }
    }
}

/// Decode `bytes` into an image that fits inside `target`
///
/// JPEG is scaled in the DCT domain, so the full-size buffer is never
/// allocated. PNG, WebP, BMP and GIF have no reduced decode: they are
/// decoded at full size under `limits.max_alloc` and shrunk right after.
pub fn decode_with_budget(
    bytes: &[u8],
    target: RenderTarget,
    limits: DecodeLimits,
) -> Result<DecodedImage, ImageDecodeError> {
    let format = image::guess_format(bytes).map_err(|_| ImageDecodeError::Unrecognized)?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(ImageDecodeError::Unsupported(format));
    }

    let (img, source_width, source_height) = if format == ImageFormat::Jpeg {
        match decode_jpeg_scaled(bytes, target, limits) {
            Ok(decoded) => decoded,
            Err(ImageDecodeError::TooLarge { width, height }) => {
                return Err(ImageDecodeError::TooLarge { width, height })
            }
            Err(err) => {
                tracing::debug!(error = %err, "scaled jpeg decode failed, falling back");
                decode_generic(bytes, format, limits)?
            }
        }
    } else {
        decode_generic(bytes, format, limits)?
    };

    let (w, h) = img.dimensions();
    let (fit_w, fit_h) = fit_within(w, h, target.width, target.height);
    let img = if (fit_w, fit_h) != (w, h) {
        img.resize(fit_w, fit_h, FilterType::Triangle)
    } else {
        img
    };

    Ok(DecodedImage::new(img, source_width, source_height))
}

fn decode_jpeg_scaled(
    bytes: &[u8],
    target: RenderTarget,
    limits: DecodeLimits,
) -> Result<(DynamicImage, u32, u32), ImageDecodeError> {
    let mut decoder = JpegScaleDecoder::new(Cursor::new(bytes));
    decoder.set_max_decoding_buffer_size(limits.max_alloc.min(usize::MAX as u64) as usize);
    decoder
        .read_info()
        .map_err(|e| ImageDecodeError::Malformed(e.to_string()))?;

    let info = decoder
        .info()
        .ok_or_else(|| ImageDecodeError::Malformed("missing jpeg header".into()))?;
    let (source_width, source_height) = (u32::from(info.width), u32::from(info.height));
    if source_width > limits.max_dimension || source_height > limits.max_dimension {
        return Err(ImageDecodeError::TooLarge {
            width: source_width,
            height: source_height,
        });
    }

    let factor = compute_downsample_factor(source_width, source_height, target.width, target.height);
    if factor > 1 {
        let req_w = (source_width / factor).clamp(1, u16::MAX as u32) as u16;
        let req_h = (source_height / factor).clamp(1, u16::MAX as u32) as u16;
        decoder
            .scale(req_w, req_h)
            .map_err(|e| ImageDecodeError::Malformed(e.to_string()))?;
    }

    let pixels = decoder
        .decode()
        .map_err(|e| ImageDecodeError::Malformed(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| ImageDecodeError::Malformed("missing jpeg output info".into()))?;

    Ok((jpeg_pixels_to_image(pixels, info)?, source_width, source_height))
}

fn jpeg_pixels_to_image(pixels: Vec<u8>, info: JpegImageInfo) -> Result<DynamicImage, ImageDecodeError> {
    let (w, h) = (u32::from(info.width), u32::from(info.height));
    let mismatch = || ImageDecodeError::Malformed("jpeg buffer size mismatch".into());

    match info.pixel_format {
        JpegPixelFormat::RGB24 => RgbImage::from_raw(w, h, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(mismatch),
        JpegPixelFormat::L8 => GrayImage::from_raw(w, h, pixels)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(mismatch),
        JpegPixelFormat::CMYK32 => {
            // Adobe CMYK jpegs are stored inverted
            let rgb: Vec<u8> = pixels
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = px[3] as u32;
                    [
                        (px[0] as u32 * k / 255) as u8,
                        (px[1] as u32 * k / 255) as u8,
                        (px[2] as u32 * k / 255) as u8,
                    ]
                })
                .collect();
            RgbImage::from_raw(w, h, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch)
        }
        JpegPixelFormat::L16 => Err(ImageDecodeError::Malformed(
            "16-bit jpeg not handled by scaled path".into(),
        )),
    }
}

fn decode_generic(
    bytes: &[u8],
    format: ImageFormat,
    limits: DecodeLimits,
) -> Result<(DynamicImage, u32, u32), ImageDecodeError> {
    let mut codec_limits = Limits::default();
    codec_limits.max_image_width = Some(limits.max_dimension);
    codec_limits.max_image_height = Some(limits.max_dimension);
    codec_limits.max_alloc = Some(limits.max_alloc);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(codec_limits);

    let img = reader.decode()?;
    let (w, h) = img.dimensions();
    Ok((img, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn test_png_fits_target() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(400, 200, Rgba([9, 9, 9, 255])));
        let bytes = encode(img, ImageFormat::Png);

        let decoded = decode_with_budget(&bytes, RenderTarget::new(100, 100), DecodeLimits::default()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
        assert_eq!(decoded.source_dimensions(), (400, 200));
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(20, 30, Rgb([1, 2, 3])));
        let bytes = encode(img, ImageFormat::Png);

        let decoded = decode_with_budget(&bytes, RenderTarget::square(2048), DecodeLimits::default()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 30));
    }

    #[test]
    fn test_jpeg_scaled_decode() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(1600, 1200, Rgb([200, 100, 50])));
        let bytes = encode(img, ImageFormat::Jpeg);

        let decoded = decode_with_budget(&bytes, RenderTarget::new(400, 300), DecodeLimits::default()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
        assert_eq!(decoded.source_dimensions(), (1600, 1200));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = decode_with_budget(b"definitely not an image", RenderTarget::square(64), DecodeLimits::default())
            .unwrap_err();
        assert!(matches!(err, ImageDecodeError::Unrecognized));
    }

    #[test]
    fn test_truncated_png_is_malformed() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 64, Rgb([1, 2, 3])));
        let bytes = encode(img, ImageFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];

        assert!(decode_with_budget(truncated, RenderTarget::square(64), DecodeLimits::default()).is_err());
    }

    #[test]
    fn test_dimension_limit() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(300, 10, Rgb([1, 2, 3])));
        let bytes = encode(img, ImageFormat::Png);
        let limits = DecodeLimits {
            max_alloc: 1024 * 1024,
            max_dimension: 100,
        };

        let err = decode_with_budget(&bytes, RenderTarget::square(64), limits).unwrap_err();
        assert!(matches!(err, ImageDecodeError::TooLarge { .. }));
    }
}
