//! Image Optimizer
//!
//! Budgeted decoding, thumbnails, filters and thumbnail warm-up.
//!
//! Decoding is synchronous and CPU bound; callers on the async side run
//! it inside `spawn_blocking`, as the readers do.

mod decode;
mod downsample;
mod encode;
mod filters;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;

use crate::cache::{CacheKey, PoolKind, SharedDecodeCache};
use crate::config::RenderConfig;
use crate::reader::{DecodedImage, RenderError, RenderResult, RenderTarget, SharedImage, SourceId};

pub use decode::{decode_with_budget, DecodeLimits, ImageDecodeError};
pub use downsample::{compute_downsample_factor, fit_within};
pub use encode::{encode, OutputFormat, DEFAULT_JPEG_QUALITY};
pub use filters::{apply_filter, FilterKind};

/// Decode and post-process page images under the configured budgets
#[derive(Clone)]
pub struct ImageOptimizer {
    config: RenderConfig,
    cache: Option<SharedDecodeCache>,
}

impl ImageOptimizer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config, cache: None }
    }

    /// Optimizer that stores preloaded thumbnails in `cache`
    pub fn with_cache(config: RenderConfig, cache: SharedDecodeCache) -> Self {
        Self {
            config,
            cache: Some(cache),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_alloc: self.config.max_decode_bytes,
            ..DecodeLimits::default()
        }
    }

    /// Default bounds for full page renders
    pub fn page_target(&self) -> RenderTarget {
        RenderTarget::square(self.config.max_image_size)
    }

    /// Default bounds for thumbnails
    pub fn thumbnail_target(&self) -> RenderTarget {
        RenderTarget::square(self.config.thumbnail_size)
    }

    pub fn decode_with_budget(
        &self,
        bytes: &[u8],
        target: RenderTarget,
    ) -> Result<DecodedImage, ImageDecodeError> {
        decode_with_budget(bytes, target, self.limits())
    }

    pub fn generate_thumbnail(
        &self,
        bytes: &[u8],
        max_dimension: u32,
    ) -> Result<DecodedImage, ImageDecodeError> {
        decode_with_budget(bytes, RenderTarget::square(max_dimension), self.limits())
    }

    pub fn apply_filter(&self, image: &DecodedImage, kind: FilterKind) -> DecodedImage {
        apply_filter(image, kind)
    }

    /// Encode with the default JPEG quality
    pub fn encode(
        &self,
        image: &DecodedImage,
        format: OutputFormat,
    ) -> Result<Vec<u8>, image::ImageError> {
        encode(image, format, DEFAULT_JPEG_QUALITY)
    }

    /// Cache key under which `preload` stores the thumbnail of `path`
    pub fn preload_key(&self, path: &Path) -> CacheKey {
        CacheKey::new(SourceId::for_path(path), 0, self.thumbnail_target())
    }

    /// Thumbnail of a standalone image file, served from the thumbnail
    /// pool when `preload` already stored it
    pub async fn load_thumbnail(&self, path: &Path) -> RenderResult<SharedImage> {
        let key = self.preload_key(path);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(PoolKind::Thumbnails, &key) {
                return Ok(hit);
            }
        }

        let thumb = Arc::new(self.thumbnail_from_file(path.to_path_buf()).await?);
        if let Some(cache) = &self.cache {
            cache.insert(PoolKind::Thumbnails, key, Arc::clone(&thumb));
        }
        Ok(thumb)
    }

    async fn thumbnail_from_file(&self, path: PathBuf) -> RenderResult<DecodedImage> {
        let optimizer = self.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)?;
            optimizer
                .generate_thumbnail(&bytes, optimizer.config.thumbnail_size)
                .map_err(|e| RenderError::decode(0, e))
        })
        .await
        .map_err(|e| RenderError::decode(0, format!("thumbnail task failed: {e}")))?
    }

    /// Warm the thumbnail pool for a batch of image files
    ///
    /// Fire-and-forget: the returned handle resolves to the number of
    /// thumbnails stored and may simply be dropped. Individual failures
    /// are logged and skipped. Must be called inside a tokio runtime.
    pub fn preload(&self, paths: Vec<PathBuf>) -> JoinHandle<usize> {
        let optimizer = self.clone();
        let concurrency = self.config.preload_concurrency.max(1);

        tokio::spawn(async move {
            let Some(cache) = optimizer.cache.clone() else {
                tracing::debug!("preload skipped, no cache attached");
                return 0;
            };

            let stored = Arc::new(AtomicUsize::new(0));
            let total = paths.len();

            stream::iter(paths)
                .for_each_concurrent(concurrency, |path| {
                    let optimizer = optimizer.clone();
                    let cache = Arc::clone(&cache);
                    let stored = Arc::clone(&stored);
                    async move {
                        let key = optimizer.preload_key(&path);
                        if cache.contains(PoolKind::Thumbnails, &key) {
                            return;
                        }

                        match optimizer.thumbnail_from_file(path.clone()).await {
                            Ok(thumb) => {
                                cache.insert(PoolKind::Thumbnails, key, Arc::new(thumb));
                                stored.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                tracing::warn!(path = %path.display(), error = %e, "thumbnail preload failed");
                            }
                        }
                    }
                })
                .await;

            let stored = stored.load(Ordering::Relaxed);
            tracing::debug!(total, stored, "thumbnail preload finished");
            stored
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, DecodeCache};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([10, 20, 30])))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_thumbnail_bound() {
        let optimizer = ImageOptimizer::new(RenderConfig::default());
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(1000, 500, Rgb([1, 1, 1])));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let thumb = optimizer.generate_thumbnail(&bytes, 200).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (200, 100));
    }

    #[tokio::test]
    async fn test_preload_swallows_failures() {
        let dir = TempDir::new().unwrap();
        let good = write_png(&dir, "good.png", 400, 400);
        let other = write_png(&dir, "other.png", 50, 80);
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").unwrap();
        let missing = dir.path().join("missing.png");

        let cache = DecodeCache::shared(&CacheConfig::default());
        let optimizer = ImageOptimizer::with_cache(RenderConfig::default(), Arc::clone(&cache));

        let stored = optimizer
            .preload(vec![good.clone(), broken, missing, other.clone()])
            .await
            .unwrap();

        assert_eq!(stored, 2);
        assert!(cache.contains(PoolKind::Thumbnails, &optimizer.preload_key(&good)));
        assert!(cache.contains(PoolKind::Thumbnails, &optimizer.preload_key(&other)));
        assert_eq!(cache.stats().pages.entries, 0);
    }

    #[tokio::test]
    async fn test_load_after_preload_is_a_hit() {
        let dir = TempDir::new().unwrap();
        let page = write_png(&dir, "page.png", 600, 300);

        let cache = DecodeCache::shared(&CacheConfig::default());
        let optimizer = ImageOptimizer::with_cache(RenderConfig::default(), Arc::clone(&cache));
        assert_eq!(optimizer.preload(vec![page.clone()]).await.unwrap(), 1);

        let before = cache.stats().thumbnails;
        let thumb = optimizer.load_thumbnail(&page).await.unwrap();
        let after = cache.stats().thumbnails;

        assert_eq!((thumb.width(), thumb.height()), (200, 100));
        assert_eq!(after.hits, before.hits + 1);
        assert_eq!(after.misses, before.misses);
        assert_eq!(after.entries, 1);
    }

    #[tokio::test]
    async fn test_load_thumbnail_errors() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").unwrap();

        let cache = DecodeCache::shared(&CacheConfig::default());
        let optimizer = ImageOptimizer::with_cache(RenderConfig::default(), Arc::clone(&cache));

        assert!(matches!(
            optimizer.load_thumbnail(&dir.path().join("missing.png")).await,
            Err(RenderError::Io(_))
        ));
        assert!(matches!(
            optimizer.load_thumbnail(&broken).await,
            Err(RenderError::DecodeFailure { .. })
        ));
        assert_eq!(cache.stats().thumbnails.entries, 0);
    }

    #[tokio::test]
    async fn test_preload_without_cache() {
        let optimizer = ImageOptimizer::new(RenderConfig::default());
        assert_eq!(optimizer.preload(vec![PathBuf::from("/nope.png")]).await.unwrap(), 0);
    }
}
