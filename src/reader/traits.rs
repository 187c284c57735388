//! Reader traits
//!
//! Format-agnostic contract implemented by every extractor and by the
//! caching decorator.

use async_trait::async_trait;

use super::error::{OpenResult, RenderResult};
use super::types::{ContainerKind, RenderTarget, SharedImage, SourceHandle, SourceId};

/// A source opened as an ordered, randomly addressable list of pages
///
/// `open` builds the page table once; `render_page` may be called
/// concurrently for different (or the same) indices; `close` is
/// idempotent.
#[async_trait]
pub trait BookReader: Send + Sync {
    /// Parse container structure and return the page count
    async fn open(&self, source: &SourceHandle) -> OpenResult<usize>;

    /// Number of pages (0 while not open)
    fn page_count(&self) -> usize;

    /// Decode one page into bounds no larger than `target`
    async fn render_page(&self, index: usize, target: RenderTarget) -> RenderResult<SharedImage>;

    /// Release handles and temp artifacts
    async fn close(&self);

    /// Container kind this reader handles
    fn kind(&self) -> ContainerKind;

    /// Identity of the open source, if any
    fn source_id(&self) -> Option<SourceId>;

    /// Container entry backing `index` (None for rasterized formats)
    fn entry_name(&self, index: usize) -> Option<String>;

    fn is_open(&self) -> bool {
        self.source_id().is_some()
    }
}
