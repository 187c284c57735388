//! Caching reader decorator
//!
//! Wraps any [`BookReader`] and consults the shared [`DecodeCache`] before
//! delegating. Only successful renders are stored, so a failed page can
//! be retried later.
//!
//! [`DecodeCache`]: crate::cache::DecodeCache

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{OpenError, OpenResult, RenderError, RenderResult};
use super::traits::BookReader;
use super::types::{ContainerKind, PageIndex, RenderTarget, SharedImage, SourceHandle, SourceId};
use crate::cache::{CacheKey, PoolKind, SharedDecodeCache};
use crate::config::RenderConfig;

pub struct CachingReader<R: BookReader> {
    inner: R,
    cache: SharedDecodeCache,
    render_timeout: Duration,
    open_timeout: Duration,
}

impl<R: BookReader> CachingReader<R> {
    pub fn new(inner: R, cache: SharedDecodeCache, config: &RenderConfig) -> Self {
        Self {
            inner,
            cache,
            render_timeout: Duration::from_secs(config.render_timeout_secs.max(1)),
            open_timeout: Duration::from_secs(config.open_timeout_secs.max(1)),
        }
    }

    pub fn with_timeout(mut self, render_timeout: Duration) -> Self {
        self.render_timeout = render_timeout;
        self
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn cache(&self) -> &SharedDecodeCache {
        &self.cache
    }

    /// Render a thumbnail through the thumbnail pool
    pub async fn render_thumbnail(&self, index: usize, max_dimension: u32) -> RenderResult<SharedImage> {
        self.render_cached(PoolKind::Thumbnails, index, RenderTarget::square(max_dimension))
            .await
    }

    /// Render with an untyped index, rejecting negatives
    pub async fn render_page_at(&self, raw_index: i64, target: RenderTarget) -> RenderResult<SharedImage> {
        let index = PageIndex::checked(raw_index, self.inner.page_count())?;
        self.render_page(index, target).await
    }

    async fn render_cached(
        &self,
        pool: PoolKind,
        index: usize,
        target: RenderTarget,
    ) -> RenderResult<SharedImage> {
        let Some(source) = self.inner.source_id() else {
            // Not open: the delegate reports NotOpen or Closed without extracting
            return self.inner.render_page(index, target).await;
        };

        let page_count = self.inner.page_count();
        if index >= page_count {
            return Err(RenderError::IndexOutOfRange {
                index: index as i64,
                page_count,
            });
        }

        let key = CacheKey::new(source, index, target);
        if let Some(hit) = self.cache.get(pool, &key) {
            return Ok(hit);
        }

        let image = tokio::time::timeout(self.render_timeout, self.inner.render_page(index, target))
            .await
            .map_err(|_| {
                tracing::warn!(source = %key.source, index, "page render timed out");
                RenderError::Timeout(self.render_timeout.as_secs())
            })??;

        if self.inner.source_id().as_ref() == Some(&key.source) {
            self.cache.insert(pool, key, Arc::clone(&image));
        } else {
            tracing::debug!(source = %key.source, index, "reader closed during render, result not cached");
        }

        Ok(image)
    }
}

#[async_trait]
impl<R: BookReader> BookReader for CachingReader<R> {
    async fn open(&self, source: &SourceHandle) -> OpenResult<usize> {
        tokio::time::timeout(self.open_timeout, self.inner.open(source))
            .await
            .map_err(|_| {
                tracing::warn!(path = %source.path().display(), kind = %source.kind(), "open timed out");
                OpenError::Timeout(self.open_timeout.as_secs())
            })?
    }

    fn page_count(&self) -> usize {
        self.inner.page_count()
    }

    async fn render_page(&self, index: usize, target: RenderTarget) -> RenderResult<SharedImage> {
        self.render_cached(PoolKind::Pages, index, target).await
    }

    /// Cached entries are left for LRU eviction so a quick reopen is cheap
    async fn close(&self) {
        self.inner.close().await
    }

    fn kind(&self) -> ContainerKind {
        self.inner.kind()
    }

    fn source_id(&self) -> Option<SourceId> {
        self.inner.source_id()
    }

    fn entry_name(&self, index: usize) -> Option<String> {
        self.inner.entry_name(index)
    }
}
