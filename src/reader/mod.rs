//! Reader abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              BookReaderFactory               │
//! │      (one active reader at a time)           │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │                CachingReader                 │──▶ DecodeCache
//! └──────────────────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         ▼             ▼              ▼
//!  ┌─────────────┐ ┌───────────┐ ┌────────────┐
//!  │ArchiveReader│ │ PdfReader │ │ EpubReader │
//!  └─────────────┘ └───────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use amnesia_comics::{BookReader, BookReaderFactory, EngineConfig, RenderTarget};
//!
//! let mut factory = BookReaderFactory::new(EngineConfig::from_env());
//! let (reader, pages) = factory.open("/books/issue-01.cbz").await?;
//! let page = reader.render_page(0, RenderTarget::new(1080, 1920)).await?;
//! ```

mod caching;
mod error;
mod factory;
mod traits;
mod types;

pub use caching::CachingReader;
pub use error::{OpenError, OpenResult, RenderError, RenderResult};
pub use factory::{BookReaderFactory, Reader};
pub use traits::BookReader;
pub use types::{
    ContainerKind, DecodedImage, PageEntry, PageIndex, PixelFormat, RenderTarget, SharedImage,
    SourceHandle, SourceId,
};
