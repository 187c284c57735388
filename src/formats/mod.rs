//! Format extractors
//!
//! Each container kind is handled by one reader. Readers enumerate their
//! pages once at open time and materialize a single page per render.
//!
//! | kind           | reader          | page bytes                      |
//! |----------------|-----------------|---------------------------------|
//! | zip (cbz)      | `ArchiveReader` | read by zip index on demand     |
//! | rar, 7z, tar   | `ArchiveReader` | pre-extracted to a workspace    |
//! | pdf            | `PdfReader`     | rasterized by MuPDF             |
//! | epub           | `EpubReader`    | referenced image or rasterized  |
//!
//! [`FormatReader`] closes the set so the factory dispatches once.

mod archive;
mod entries;
mod epub;
mod pdf;
mod rar;
mod session;
mod sevenz;
mod store;
mod tar;
mod workspace;
mod zip;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::imaging::DecodeLimits;
use crate::reader::{
    BookReader, ContainerKind, OpenResult, RenderResult, RenderTarget, SharedImage, SourceHandle,
    SourceId,
};

pub use archive::ArchiveReader;
pub use entries::{
    is_image_entry, is_page_document, normalize_entry_name, sort_key, IMAGE_EXTENSIONS,
    PAGE_DOCUMENT_EXTENSIONS,
};
pub use epub::EpubReader;
pub use pdf::PdfReader;
pub use workspace::{sweep_stale_workspaces, TempWorkspace, STALE_AFTER, WORKSPACE_PREFIX};

/// Limits and locations shared by every reader
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub decode: DecodeLimits,
    /// Entries declaring more bytes than this are skipped
    pub max_entry_bytes: u64,
    /// Parent of extraction workspaces
    pub temp_root: PathBuf,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ReaderSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            decode: DecodeLimits {
                max_alloc: config.render.max_decode_bytes,
                ..DecodeLimits::default()
            },
            max_entry_bytes: config.render.max_entry_bytes,
            temp_root: config.workspace.temp_root.clone(),
        }
    }
}

/// Closed set of format readers
pub enum FormatReader {
    Archive(ArchiveReader),
    Pdf(PdfReader),
    Epub(EpubReader),
}

impl FormatReader {
    /// Reader for `kind`; no IO happens here
    pub fn for_kind(kind: ContainerKind, settings: ReaderSettings) -> Self {
        match kind {
            ContainerKind::Zip | ContainerKind::Rar | ContainerKind::SevenZip | ContainerKind::Tar => {
                FormatReader::Archive(ArchiveReader::new(kind, settings))
            }
            ContainerKind::Pdf => FormatReader::Pdf(PdfReader::new(settings)),
            ContainerKind::Epub => FormatReader::Epub(EpubReader::new(settings)),
        }
    }

    pub fn as_epub(&self) -> Option<&EpubReader> {
        match self {
            FormatReader::Epub(reader) => Some(reader),
            _ => None,
        }
    }

    pub fn as_archive(&self) -> Option<&ArchiveReader> {
        match self {
            FormatReader::Archive(reader) => Some(reader),
            _ => None,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $reader:ident => $call:expr) => {
        match $self {
            FormatReader::Archive($reader) => $call,
            FormatReader::Pdf($reader) => $call,
            FormatReader::Epub($reader) => $call,
        }
    };
}

#[async_trait]
impl BookReader for FormatReader {
    async fn open(&self, source: &SourceHandle) -> OpenResult<usize> {
        dispatch!(self, reader => reader.open(source).await)
    }

    fn page_count(&self) -> usize {
        dispatch!(self, reader => reader.page_count())
    }

    async fn render_page(&self, index: usize, target: RenderTarget) -> RenderResult<SharedImage> {
        dispatch!(self, reader => reader.render_page(index, target).await)
    }

    async fn close(&self) {
        dispatch!(self, reader => reader.close().await)
    }

    fn kind(&self) -> ContainerKind {
        dispatch!(self, reader => reader.kind())
    }

    fn source_id(&self) -> Option<SourceId> {
        dispatch!(self, reader => reader.source_id())
    }

    fn entry_name(&self, index: usize) -> Option<String> {
        dispatch!(self, reader => reader.entry_name(index))
    }
}
