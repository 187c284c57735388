//! Decode cache with LRU eviction
//!
//! A single process-wide store of decoded page images and thumbnails,
//! shared by every open and recently closed source.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 DecodeCache                   │
//! │  ┌─────────────────┐   ┌──────────────────┐   │
//! │  │   pages pool    │   │ thumbnails pool  │   │
//! │  │ (byte budget A) │   │ (byte budget B)  │   │
//! │  └─────────────────┘   └──────────────────┘   │
//! └───────────────────────────────────────────────┘
//!           keyed by (source, page, target)
//! ```
//!
//! # Thread Safety
//!
//! Each pool sits behind its own `parking_lot::Mutex`. Lookups, inserts
//! and evictions take the lock for the whole operation so concurrent
//! renders (prefetch next page while the current one decodes) never
//! observe a half-evicted pool.

mod pool;
mod stats;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::reader::{RenderTarget, SharedImage, SourceId};

pub use pool::{Admission, CacheEntry, SizedLru};
pub use stats::{CacheStats, PoolStats};

const MIB: usize = 1024 * 1024;

/// Cache configuration options
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Byte budget for full-size pages
    pub page_budget_bytes: usize,
    /// Byte budget for thumbnails
    pub thumbnail_budget_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_budget_bytes: 256 * MIB,
            thumbnail_budget_bytes: 32 * MIB,
        }
    }
}

/// Which pool an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Pages,
    Thumbnails,
}

/// Cache key for decoded output
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    /// Source identity
    pub source: SourceId,
    /// Page index
    pub index: usize,
    /// Requested bounds
    pub target: RenderTarget,
}

impl CacheKey {
    pub fn new(source: SourceId, index: usize, target: RenderTarget) -> Self {
        Self {
            source,
            index,
            target,
        }
    }
}

/// Two-pool decoded image cache
pub struct DecodeCache {
    pages: Mutex<SizedLru<CacheKey, SharedImage>>,
    thumbnails: Mutex<SizedLru<CacheKey, SharedImage>>,
}

/// Shared handle to the process-wide cache
pub type SharedDecodeCache = Arc<DecodeCache>;

impl Default for DecodeCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl DecodeCache {
    /// Create a new cache with the given budgets
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pages: Mutex::new(SizedLru::new(config.page_budget_bytes)),
            thumbnails: Mutex::new(SizedLru::new(config.thumbnail_budget_bytes)),
        }
    }

    /// Create a shared cache
    pub fn shared(config: &CacheConfig) -> SharedDecodeCache {
        Arc::new(Self::new(config))
    }

    fn pool(&self, kind: PoolKind) -> &Mutex<SizedLru<CacheKey, SharedImage>> {
        match kind {
            PoolKind::Pages => &self.pages,
            PoolKind::Thumbnails => &self.thumbnails,
        }
    }

    /// Look up an entry, bumping its recency on hit
    pub fn get(&self, kind: PoolKind, key: &CacheKey) -> Option<SharedImage> {
        let hit = self.pool(kind).lock().get(key);
        match &hit {
            Some(_) => tracing::trace!(source = %key.source, index = key.index, ?kind, "cache hit"),
            None => tracing::trace!(source = %key.source, index = key.index, ?kind, "cache miss"),
        }
        hit
    }

    /// Store an entry, evicting LRU entries as needed
    ///
    /// An image larger than the whole pool budget is not stored.
    pub fn insert(&self, kind: PoolKind, key: CacheKey, image: SharedImage) -> Admission {
        let size = image.byte_size();
        let source = key.source.clone();
        let index = key.index;
        let admission = self.pool(kind).lock().insert(key, image, size);

        match admission {
            Admission::Stored { evicted } if evicted > 0 => {
                tracing::debug!(source = %source, index, ?kind, evicted, bytes = size, "evicted to make room");
            }
            Admission::Rejected => {
                tracing::debug!(source = %source, index, ?kind, bytes = size, "entry exceeds pool budget, not cached");
            }
            _ => {}
        }

        admission
    }

    pub fn contains(&self, kind: PoolKind, key: &CacheKey) -> bool {
        self.pool(kind).lock().peek(key).is_some()
    }

    /// Drop all entries and reset counters
    pub fn clear(&self) {
        self.pages.lock().clear();
        self.thumbnails.lock().clear();
        tracing::info!("decode cache cleared");
    }

    /// Shrink each pool to at most `fraction` of its budget
    ///
    /// Returns the number of evicted entries.
    pub fn trim(&self, fraction: f32) -> usize {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut evicted = 0;
        for pool in [&self.pages, &self.thumbnails] {
            let mut pool = pool.lock();
            let target = (pool.budget() as f64 * fraction as f64) as usize;
            evicted += pool.shrink_to(target);
        }
        tracing::info!(fraction, evicted, "decode cache trimmed");
        evicted
    }

    /// Snapshot of both pools
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            pages: self.pages.lock().stats(),
            thumbnails: self.thumbnails.lock().stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DecodedImage;
    use image::{DynamicImage, ImageBuffer, Rgba};
    use std::path::Path;

    fn image_of(width: u32, height: u32) -> SharedImage {
        let buf = ImageBuffer::from_pixel(width, height, Rgba([0u8, 0, 0, 255]));
        Arc::new(DecodedImage::from_image(DynamicImage::ImageRgba8(buf)))
    }

    fn key(index: usize) -> CacheKey {
        CacheKey::new(
            SourceId::for_path(Path::new("/books/test.cbz")),
            index,
            RenderTarget::square(64),
        )
    }

    #[test]
    fn test_pools_are_independent() {
        let cache = DecodeCache::new(&CacheConfig {
            page_budget_bytes: 1024,
            thumbnail_budget_bytes: 1024,
        });

        cache.insert(PoolKind::Pages, key(0), image_of(8, 8));
        assert!(cache.contains(PoolKind::Pages, &key(0)));
        assert!(!cache.contains(PoolKind::Thumbnails, &key(0)));

        let stats = cache.stats();
        assert_eq!(stats.pages.entries, 1);
        assert_eq!(stats.pages.bytes_used, 256);
        assert_eq!(stats.thumbnails.entries, 0);
    }

    #[test]
    fn test_pool_budget_holds_under_pressure() {
        // 8x8 RGBA = 256 bytes, budget fits 3
        let cache = DecodeCache::new(&CacheConfig {
            page_budget_bytes: 800,
            thumbnail_budget_bytes: 800,
        });

        for index in 0..20 {
            cache.insert(PoolKind::Pages, key(index), image_of(8, 8));
            assert!(cache.stats().pages.bytes_used <= 800);
        }
        assert_eq!(cache.stats().pages.entries, 3);
        assert!(cache.contains(PoolKind::Pages, &key(19)));
        assert!(!cache.contains(PoolKind::Pages, &key(0)));
    }

    #[test]
    fn test_rejects_image_larger_than_budget() {
        let cache = DecodeCache::new(&CacheConfig {
            page_budget_bytes: 100,
            thumbnail_budget_bytes: 100,
        });
        let admission = cache.insert(PoolKind::Pages, key(0), image_of(8, 8));
        assert_eq!(admission, Admission::Rejected);
        assert_eq!(cache.stats().pages.entries, 0);
    }

    #[test]
    fn test_clear_resets_counters() {
        let cache = DecodeCache::default();
        cache.insert(PoolKind::Thumbnails, key(0), image_of(2, 2));
        assert!(cache.get(PoolKind::Thumbnails, &key(0)).is_some());
        assert!(cache.get(PoolKind::Thumbnails, &key(1)).is_none());

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.pool_size(), 0);
        assert_eq!(stats.thumbnails.hits, 0);
        assert_eq!(stats.thumbnails.misses, 0);
    }

    #[test]
    fn test_trim() {
        let cache = DecodeCache::new(&CacheConfig {
            page_budget_bytes: 2560,
            thumbnail_budget_bytes: 2560,
        });
        for index in 0..10 {
            cache.insert(PoolKind::Pages, key(index), image_of(8, 8));
        }
        let evicted = cache.trim(0.5);
        assert_eq!(evicted, 5);
        assert_eq!(cache.stats().pages.bytes_used, 1280);
    }

    #[test]
    fn test_concurrent_inserts_keep_budget() {
        let cache = Arc::new(DecodeCache::new(&CacheConfig {
            page_budget_bytes: 256 * 10,
            thumbnail_budget_bytes: 256,
        }));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let k = key(t * 1000 + i);
                        cache.insert(PoolKind::Pages, k.clone(), image_of(8, 8));
                        cache.get(PoolKind::Pages, &k);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.pages.bytes_used <= stats.pages.budget);
        assert_eq!(stats.pages.entries, 10);
        assert_eq!(stats.pages.bytes_used, 2560);
    }
}
