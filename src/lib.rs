//! Amnesia Comics Library
//!
//! Comic book page engine: opens CBZ, CBR, CB7, CBT, PDF and EPUB
//! sources as an ordered list of pages and renders them under a memory
//! budget. The command line front end is in main.rs.
//!
//! # Modules
//!
//! - `reader`: Reader trait, caching decorator and factory
//! - `formats`: Per-container extractors
//! - `cache`: Two-pool decode cache
//! - `imaging`: Budgeted decode, thumbnails, filters
//! - `config`: Engine configuration

pub mod cache;
pub mod config;
pub mod formats;
pub mod imaging;
pub mod reader;

// MuPDF wrapper used by the PDF and EPUB readers
mod mupdf;

pub use cache::{CacheConfig, CacheStats, DecodeCache, PoolKind, PoolStats, SharedDecodeCache};
pub use config::{EngineConfig, RenderConfig, WorkspaceConfig};
pub use imaging::{FilterKind, ImageOptimizer, OutputFormat};
pub use reader::{
    BookReader, BookReaderFactory, CachingReader, ContainerKind, DecodedImage, OpenError,
    OpenResult, PageEntry, PageIndex, Reader, RenderError, RenderResult, RenderTarget,
    SharedImage, SourceHandle, SourceId,
};
