//! MuPDF wrapper
//!
//! `fz_context` is not thread-safe, so documents are only touched through
//! [`SafeDocument`], which serializes access and opens a fresh document per
//! operation. Callers run these operations inside `spawn_blocking`.

mod raster;
mod safe;

pub use raster::{pixmap_to_image, rasterize_markup, render_page_to_fit, XHTML_MAGIC};
pub use safe::{DocumentSource, SafeDocument};
