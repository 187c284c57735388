//! Core reader types
//!
//! Format-agnostic types shared by every extractor, the decode cache and
//! the factory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{OpenError, OpenResult, RenderError, RenderResult};

/// Container kind, selected from the trailing file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Zip,
    Rar,
    SevenZip,
    Tar,
    Pdf,
    Epub,
}

impl ContainerKind {
    /// Detect kind from a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "cbz" | "zip" => Some(Self::Zip),
            "cbr" | "rar" => Some(Self::Rar),
            "cb7" => Some(Self::SevenZip),
            "cbt" => Some(Self::Tar),
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }

    /// Detect kind from a path. Never touches the filesystem.
    pub fn from_path(path: &Path) -> OpenResult<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        Self::from_extension(ext).ok_or_else(|| {
            OpenError::UnsupportedFormat(if ext.is_empty() {
                path.display().to_string()
            } else {
                ext.to_string()
            })
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::Tar => "tar",
            Self::Pdf => "pdf",
            Self::Epub => "epub",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a source, used in cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    /// Hash the path together with size and mtime when they are readable
    pub fn for_path(path: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());

        if let Ok(meta) = std::fs::metadata(path) {
            hasher.update(meta.len().to_le_bytes());
            if let Some(since) = meta.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            {
                hasher.update(since.as_secs().to_le_bytes());
                hasher.update(since.subsec_nanos().to_le_bytes());
            }
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// Opaque handle for one container to open
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    path: PathBuf,
    kind: ContainerKind,
    id: SourceId,
}

impl SourceHandle {
    /// Build a handle, rejecting unknown extensions before any IO
    pub fn new<P: AsRef<Path>>(path: P) -> OpenResult<Self> {
        let kind = ContainerKind::from_path(path.as_ref())?;
        let path = std::path::absolute(path.as_ref()).unwrap_or_else(|_| path.as_ref().to_path_buf());
        let id = SourceId::for_path(&path);
        Ok(Self { path, kind, id })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }
}

/// One page inside a container, in page order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    /// Entry name as stored in the container
    pub name: String,
    /// Case-folded, separator-normalized name used for ordering
    pub sort_key: String,
    /// Container-internal position (zip index, extracted file slot)
    pub slot: usize,
    /// Uncompressed size when the container reports one
    pub size: u64,
}

/// Requested output bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Square bounds used for thumbnails
    pub fn square(max_dimension: u32) -> Self {
        Self::new(max_dimension, max_dimension)
    }

    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::square(2048)
    }
}

/// Pixel layout of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
    Other,
}

/// Decoded page pixels plus the size of the source they came from
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    source_width: u32,
    source_height: u32,
}

/// Decoded image shared between the cache and callers
pub type SharedImage = Arc<DecodedImage>;

impl DecodedImage {
    pub fn new(image: DynamicImage, source_width: u32, source_height: u32) -> Self {
        Self {
            image,
            source_width,
            source_height,
        }
    }

    /// Wrap an image that was not downsampled
    pub fn from_image(image: DynamicImage) -> Self {
        let (w, h) = image.dimensions();
        Self::new(image, w, h)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Dimensions of the encoded source before downsampling
    pub fn source_dimensions(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match &self.image {
            DynamicImage::ImageLuma8(_) => PixelFormat::Luma8,
            DynamicImage::ImageRgb8(_) => PixelFormat::Rgb8,
            DynamicImage::ImageRgba8(_) => PixelFormat::Rgba8,
            _ => PixelFormat::Other,
        }
    }

    /// Raw pixel bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    /// Bytes held by the pixel buffer, used for cache budgeting
    pub fn byte_size(&self) -> usize {
        self.image.as_bytes().len()
    }
}

/// Conversion for page indices arriving from untyped callers
pub struct PageIndex;

impl PageIndex {
    /// Validate `raw` against `page_count`
    pub fn checked(raw: i64, page_count: usize) -> RenderResult<usize> {
        match usize::try_from(raw) {
            Ok(index) if index < page_count => Ok(index),
            _ => Err(RenderError::IndexOutOfRange {
                index: raw,
                page_count,
            }),
        }
    }
}
