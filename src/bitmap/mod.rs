//! Tile bitmaps and their sharing/reuse machinery.
//!
//! A [`TileBitmap`] owns one decoded RGBA8 tile. Payloads are `Bytes`, so
//! cloning a bitmap across the cache, the resident tile map, and published
//! snapshots never copies pixels. [`CacheTileBitmap`] adds the
//! reference-counted display tracking the memory cache needs to know which
//! entries are safe to evict.

mod cache;
mod pool;

pub use cache::{
    CacheHelper, MemoryTileBitmapCache, TileBitmapCache, DEFAULT_MEMORY_CACHE_CAPACITY,
};
pub use pool::{BitmapPool, DEFAULT_BITMAP_POOL_CAPACITY};

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::geom::{IntRect, IntSize};

/// Where a tile bitmap came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapFrom {
    /// Decoded locally for this tile.
    Local,
    /// Served from the tile bitmap memory cache.
    MemoryCache,
}

/// Build the cache key for a tile: image key + sample size + source rect.
pub fn tile_bitmap_key(image_key: &str, sample_size: u32, src_rect: IntRect) -> String {
    format!("{image_key}@{sample_size}x{src_rect}")
}

// =============================================================================
// TileBitmap
// =============================================================================

/// One decoded tile: RGBA8 pixels plus identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBitmap {
    /// Cache key: image key, sample size, and source rect.
    pub key: String,

    /// Pixel dimensions of the decoded tile.
    pub size: IntSize,

    /// RGBA8 pixel payload, row-major, no padding.
    pub pixels: Bytes,
}

impl TileBitmap {
    pub fn new(key: impl Into<String>, size: IntSize, pixels: Bytes) -> Self {
        Self {
            key: key.into(),
            size,
            pixels,
        }
    }

    pub fn width(&self) -> i32 {
        self.size.width
    }

    pub fn height(&self) -> i32 {
        self.size.height
    }

    /// Payload size in bytes.
    pub fn byte_count(&self) -> usize {
        self.pixels.len()
    }
}

// =============================================================================
// CacheTileBitmap
// =============================================================================

/// A cached tile bitmap with display reference counting.
///
/// The engine calls [`CacheTileBitmap::set_is_displayed`] symmetrically as
/// the tile enters and leaves the visible set; the cache refuses to evict
/// entries whose count is above zero. Clones share one counter.
#[derive(Debug, Clone)]
pub struct CacheTileBitmap {
    bitmap: Arc<TileBitmap>,
    display_count: Arc<AtomicI32>,
    disallow_reuse: bool,
}

impl CacheTileBitmap {
    pub fn new(bitmap: Arc<TileBitmap>, disallow_reuse: bool) -> Self {
        Self {
            bitmap,
            display_count: Arc::new(AtomicI32::new(0)),
            disallow_reuse,
        }
    }

    pub fn bitmap(&self) -> &TileBitmap {
        &self.bitmap
    }

    pub fn key(&self) -> &str {
        &self.bitmap.key
    }

    pub fn byte_count(&self) -> usize {
        self.bitmap.byte_count()
    }

    /// Whether the pixel payload must never be handed to the reuse pool.
    pub fn disallow_reuse(&self) -> bool {
        self.disallow_reuse
    }

    /// Track a display reference. Calls must be balanced 1:1 per
    /// displaying tile; the count never goes below zero.
    pub fn set_is_displayed(&self, displayed: bool) {
        if displayed {
            self.display_count.fetch_add(1, Ordering::AcqRel);
        } else {
            // Clamp at zero in case of an unbalanced release
            let previous = self.display_count.fetch_sub(1, Ordering::AcqRel);
            if previous <= 0 {
                self.display_count.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    pub fn is_displayed(&self) -> bool {
        self.display_count.load(Ordering::Acquire) > 0
    }

    pub fn display_count(&self) -> i32 {
        self.display_count.load(Ordering::Acquire).max(0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(len: usize) -> TileBitmap {
        TileBitmap::new("k", IntSize::new(1, 1), Bytes::from(vec![0u8; len]))
    }

    #[test]
    fn test_tile_bitmap_key_format() {
        let key = tile_bitmap_key("file://a.jpg", 4, IntRect::new(0, 0, 100, 50));
        assert_eq!(key, "file://a.jpg@4x(0,0,100,50)");
    }

    #[test]
    fn test_byte_count() {
        assert_eq!(bitmap(16).byte_count(), 16);
    }

    #[test]
    fn test_display_counting_balanced() {
        let cached = CacheTileBitmap::new(Arc::new(bitmap(4)), false);
        assert!(!cached.is_displayed());

        cached.set_is_displayed(true);
        cached.set_is_displayed(true);
        assert_eq!(cached.display_count(), 2);

        cached.set_is_displayed(false);
        assert!(cached.is_displayed());
        cached.set_is_displayed(false);
        assert!(!cached.is_displayed());
    }

    #[test]
    fn test_display_count_clamps_at_zero() {
        let cached = CacheTileBitmap::new(Arc::new(bitmap(4)), false);
        cached.set_is_displayed(false);
        assert_eq!(cached.display_count(), 0);

        cached.set_is_displayed(true);
        assert!(cached.is_displayed());
    }

    #[test]
    fn test_clones_share_counter() {
        let cached = CacheTileBitmap::new(Arc::new(bitmap(4)), false);
        let clone = cached.clone();
        clone.set_is_displayed(true);
        assert!(cached.is_displayed());
    }
}
