//! Page rasterization
//!
//! Renders MuPDF pages into `DecodedImage`s sized to a `RenderTarget`.

use image::{DynamicImage, RgbaImage};
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use crate::reader::{DecodedImage, RenderTarget};

/// Mime type MuPDF uses for its XHTML handler
pub const XHTML_MAGIC: &str = "application/xhtml+xml";

/// Font size used when laying out reflowable markup
const LAYOUT_EM: f32 = 12.0;

/// Rasterize `index` scaled to fit `target`
///
/// Vector pages may be scaled up; `max_pixel_bytes` caps the RGBA buffer.
pub fn render_page_to_fit(
    doc: &Document,
    index: usize,
    target: RenderTarget,
    max_pixel_bytes: u64,
) -> Result<DecodedImage, mupdf::Error> {
    let page = doc.load_page(index as i32)?;
    let bounds = page.bounds()?;
    let page_width = (bounds.x1 - bounds.x0).max(1.0);
    let page_height = (bounds.y1 - bounds.y0).max(1.0);

    let mut scale = f32::min(
        target.width as f32 / page_width,
        target.height as f32 / page_height,
    );
    let pixel_bytes = (page_width * scale) as f64 * (page_height * scale) as f64 * 4.0;
    if pixel_bytes > max_pixel_bytes as f64 {
        scale *= (max_pixel_bytes as f64 / pixel_bytes).sqrt() as f32;
    }

    let matrix = Matrix::new_scale(scale, scale);
    let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), true, false)?;
    let image = pixmap_to_image(&pixmap);

    Ok(DecodedImage::new(
        image,
        page_width.round() as u32,
        page_height.round() as u32,
    ))
}

/// Lay out reflowable markup at the target size and render its first page
pub fn rasterize_markup(
    doc: &mut Document,
    target: RenderTarget,
    max_pixel_bytes: u64,
) -> Result<DecodedImage, mupdf::Error> {
    if doc.is_reflowable().unwrap_or(false) {
        doc.layout(target.width as f32, target.height as f32, LAYOUT_EM)?;
    }
    render_page_to_fit(doc, 0, target, max_pixel_bytes)
}

/// Copy pixmap samples into an RGBA image
pub fn pixmap_to_image(pixmap: &Pixmap) -> DynamicImage {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = (pixmap.n() as usize).max(1);

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for px in samples.chunks(n).take(width as usize * height as usize) {
        let r = px.first().copied().unwrap_or(0);
        let g = px.get(1).copied().unwrap_or(r);
        let b = px.get(2).copied().unwrap_or(r);
        let a = if n >= 4 { px.get(3).copied().unwrap_or(255) } else { 255 };
        rgba.extend_from_slice(&[r, g, b, a]);
    }
    rgba.resize(width as usize * height as usize * 4, 0);

    match RgbaImage::from_raw(width, height, rgba) {
        Some(buf) => DynamicImage::ImageRgba8(buf),
        None => DynamicImage::ImageRgba8(RgbaImage::new(width.max(1), height.max(1))),
    }
}
