//! Reader factory
//!
//! Owns the single active reader. Creating a reader for a new source
//! closes the previous one first, so two sources never hold extraction
//! workspaces at the same time.

use std::path::Path;
use std::sync::Arc;

use super::caching::CachingReader;
use super::error::OpenResult;
use super::traits::BookReader;
use super::types::SourceHandle;
use crate::cache::{DecodeCache, SharedDecodeCache};
use crate::config::EngineConfig;
use crate::formats::{sweep_stale_workspaces, FormatReader, ReaderSettings, STALE_AFTER};
use crate::imaging::ImageOptimizer;

/// Reader handed out by the factory
pub type Reader = CachingReader<FormatReader>;

pub struct BookReaderFactory {
    config: EngineConfig,
    settings: ReaderSettings,
    cache: SharedDecodeCache,
    optimizer: ImageOptimizer,
    current: Option<Arc<Reader>>,
}

impl BookReaderFactory {
    /// Create a factory with its own decode cache
    pub fn new(config: EngineConfig) -> Self {
        let cache = DecodeCache::shared(&config.cache);
        Self::with_cache(config, cache)
    }

    /// Create a factory over an existing process-wide cache
    pub fn with_cache(config: EngineConfig, cache: SharedDecodeCache) -> Self {
        let swept = sweep_stale_workspaces(&config.workspace.temp_root, STALE_AFTER);
        if swept > 0 {
            tracing::info!(removed = swept, root = %config.workspace.temp_root.display(), "removed stale workspaces");
        }

        Self {
            settings: ReaderSettings::from_config(&config),
            optimizer: ImageOptimizer::with_cache(config.render.clone(), Arc::clone(&cache)),
            cache,
            config,
            current: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedDecodeCache {
        &self.cache
    }

    pub fn optimizer(&self) -> &ImageOptimizer {
        &self.optimizer
    }

    /// The active reader, if any
    pub fn current(&self) -> Option<Arc<Reader>> {
        self.current.clone()
    }

    /// Select the extractor for `source` and wrap it in the cache
    ///
    /// The previous reader is closed before the new one is handed out.
    /// The returned reader is not opened yet.
    pub async fn create(&mut self, source: &SourceHandle) -> Arc<Reader> {
        self.release_resources().await;

        let inner = FormatReader::for_kind(source.kind(), self.settings.clone());
        let reader = Arc::new(CachingReader::new(
            inner,
            Arc::clone(&self.cache),
            &self.config.render,
        ));
        tracing::debug!(path = %source.path().display(), kind = %source.kind(), "reader created");

        self.current = Some(Arc::clone(&reader));
        reader
    }

    /// Create and open a reader for `path`
    ///
    /// Unknown extensions fail with `UnsupportedFormat` before the
    /// filesystem is touched and before the current reader is closed.
    pub async fn open<P: AsRef<Path>>(&mut self, path: P) -> OpenResult<(Arc<Reader>, usize)> {
        let source = SourceHandle::new(path)?;
        let reader = self.create(&source).await;

        match reader.open(&source).await {
            Ok(page_count) => Ok((reader, page_count)),
            Err(e) => {
                tracing::warn!(path = %source.path().display(), kind = %source.kind(), error = %e, "open failed");
                self.current = None;
                Err(e)
            }
        }
    }

    /// Close the active reader outside the create/close cycle
    ///
    /// Cache entries stay until evicted.
    pub async fn release_resources(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.close().await;
        }
    }
}
