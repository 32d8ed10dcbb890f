//! Tile bitmap memory cache.
//!
//! Decoded tiles are expensive; the cache lets a tile that scrolls back
//! into view skip the region decode entirely. Entries are reference
//! counted through [`CacheTileBitmap::set_is_displayed`], and the cache
//! never evicts an entry that is currently displayed: a displayed victim
//! is re-promoted instead, so eviction can only reclaim invisible tiles.
//!
//! # Degrade path
//!
//! Caching is a capability, not a requirement. [`CacheHelper`] wraps an
//! optional cache plus a disabled flag; with no cache configured or
//! caching disabled every lookup misses and every store is a no-op, which
//! simply means each tile decodes directly.

use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::trace;

use crate::probe::ImageInfo;

use super::{CacheTileBitmap, TileBitmap};

/// Default memory cache capacity: 64MB of decoded tiles.
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Maximum number of entries (to bound LRU bookkeeping).
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// TileBitmapCache trait
// =============================================================================

/// The cache capability consumed by the tile scheduler.
///
/// Implementations may be backed by this crate's
/// [`MemoryTileBitmapCache`] or by an external image-loader cache shared
/// with thumbnail decoding.
#[async_trait]
pub trait TileBitmapCache: Send + Sync {
    /// Look up a tile. A hit marks the entry as recently used.
    async fn get(&self, key: &str) -> Option<CacheTileBitmap>;

    /// Store a tile, returning the shared cache entry on success.
    ///
    /// `disallow_reuse` marks the payload as off-limits for the bitmap
    /// reuse pool (the entry shares it for its whole cache lifetime).
    async fn put(
        &self,
        key: &str,
        bitmap: TileBitmap,
        image_key: &str,
        image_info: &ImageInfo,
        disallow_reuse: bool,
    ) -> Option<CacheTileBitmap>;
}

// =============================================================================
// MemoryTileBitmapCache
// =============================================================================

/// Byte-sized LRU cache for decoded tile bitmaps.
pub struct MemoryTileBitmapCache {
    cache: RwLock<LruCache<String, CacheTileBitmap>>,
    max_size: usize,
    current_size: RwLock<usize>,
}

impl MemoryTileBitmapCache {
    /// Create a cache with the default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Create a cache with the given byte capacity.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(
                std::num::NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap(),
            )),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Current number of cached tiles.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Drop every entry, displayed or not. Only for teardown and tests.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }
}

impl Default for MemoryTileBitmapCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileBitmapCache for MemoryTileBitmapCache {
    async fn get(&self, key: &str) -> Option<CacheTileBitmap> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    async fn put(
        &self,
        key: &str,
        bitmap: TileBitmap,
        image_key: &str,
        _image_info: &ImageInfo,
        disallow_reuse: bool,
    ) -> Option<CacheTileBitmap> {
        let entry = CacheTileBitmap::new(Arc::new(bitmap), disallow_reuse);
        let entry_size = entry.byte_count();

        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        // If the key exists, subtract the old size first
        if let Some(old) = cache.peek(key) {
            *current_size = current_size.saturating_sub(old.byte_count());
        }

        cache.put(key.to_string(), entry.clone());
        *current_size += entry_size;

        // Evict until under capacity, skipping (re-promoting) entries that
        // are still displayed. Bounded by the entry count so a cache full
        // of displayed tiles cannot loop forever.
        let mut remaining = cache.len();
        while *current_size > self.max_size && remaining > 0 {
            remaining -= 1;
            match cache.pop_lru() {
                Some((victim_key, victim)) if victim.is_displayed() => {
                    trace!(key = %victim_key, "victim displayed, re-promoting");
                    cache.put(victim_key, victim);
                }
                Some((victim_key, victim)) => {
                    trace!(key = %victim_key, image_key, "evicting tile bitmap");
                    *current_size = current_size.saturating_sub(victim.byte_count());
                }
                None => break,
            }
        }

        Some(entry)
    }
}

// =============================================================================
// CacheHelper
// =============================================================================

/// Optional-cache wrapper with the disabled/no-op degrade path.
#[derive(Clone)]
pub struct CacheHelper {
    cache: Option<Arc<dyn TileBitmapCache>>,
    disabled: bool,
}

impl CacheHelper {
    pub fn new(cache: Option<Arc<dyn TileBitmapCache>>, disabled: bool) -> Self {
        Self { cache, disabled }
    }

    /// A helper with no cache at all.
    pub fn none() -> Self {
        Self {
            cache: None,
            disabled: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.disabled && self.cache.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<CacheTileBitmap> {
        if self.disabled {
            return None;
        }
        self.cache.as_ref()?.get(key).await
    }

    pub async fn put(
        &self,
        key: &str,
        bitmap: TileBitmap,
        image_key: &str,
        image_info: &ImageInfo,
        disallow_reuse: bool,
    ) -> Option<CacheTileBitmap> {
        if self.disabled {
            return None;
        }
        self.cache
            .as_ref()?
            .put(key, bitmap, image_key, image_info, disallow_reuse)
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================
