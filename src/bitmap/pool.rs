//! Reusable pixel-buffer pool.
//!
//! Region decodes are allocation-heavy: every tile wants a fresh RGBA8
//! buffer of a handful of fixed shapes. The pool keeps freed buffers on
//! shelves keyed by byte length and hands them back to later decodes,
//! the explicit-arena replacement for platform `inBitmap` reuse.
//!
//! Buffers circulate as `BytesMut`: a decode fills one, freezes it into
//! the `Bytes` payload of a [`TileBitmap`](super::TileBitmap), and when
//! the tile is discarded the payload is reclaimed with
//! [`Bytes::try_into_mut`], which only succeeds if nothing else (cache,
//! snapshot) still shares it. A shared or oversized buffer is simply
//! dropped to the allocator.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use crate::geom::IntSize;

/// Default pool capacity: 32MB of idle buffers.
pub const DEFAULT_BITMAP_POOL_CAPACITY: usize = 32 * 1024 * 1024;

/// Bytes per RGBA8 pixel.
const BYTES_PER_PIXEL: usize = 4;

struct PoolShelves {
    /// Idle buffers grouped by exact byte length, reused LIFO.
    shelves: HashMap<usize, Vec<BytesMut>>,
    /// Total idle bytes across all shelves.
    total_bytes: usize,
}

/// A byte-capacity-bounded free list of decode buffers.
pub struct BitmapPool {
    inner: Mutex<PoolShelves>,
    capacity: usize,
}

impl BitmapPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolShelves {
                shelves: HashMap::new(),
                total_bytes: 0,
            }),
            capacity,
        }
    }

    /// A pool that never retains anything; every acquire misses and every
    /// release drops. Used when bitmap reuse is disabled.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Byte length of an RGBA8 buffer for `size`.
    pub fn byte_len_for(size: IntSize) -> usize {
        size.width.max(0) as usize * size.height.max(0) as usize * BYTES_PER_PIXEL
    }

    /// Take an idle buffer of exactly `byte_len` bytes, if one is shelved.
    pub fn acquire(&self, byte_len: usize) -> Option<BytesMut> {
        if byte_len == 0 {
            return None;
        }
        let mut inner = self.inner.lock();
        let buffer = inner.shelves.get_mut(&byte_len)?.pop()?;
        inner.total_bytes -= byte_len;
        Some(buffer)
    }

    /// Shelve a buffer for reuse, unless the pool is over capacity.
    pub fn release(&self, buffer: BytesMut) {
        let len = buffer.len();
        if len == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.total_bytes + len > self.capacity {
            trace!(len, "bitmap pool full, dropping buffer");
            return;
        }
        inner.shelves.entry(len).or_default().push(buffer);
        inner.total_bytes += len;
    }

    /// Reclaim a frozen payload back into the pool.
    ///
    /// Succeeds only when the payload is uniquely owned; a buffer still
    /// shared with the cache or a live snapshot is dropped instead, which
    /// is the correct degrade (it will be freed when the last clone goes).
    pub fn release_bytes(&self, pixels: Bytes) {
        match pixels.try_into_mut() {
            Ok(buffer) => self.release(buffer),
            Err(_shared) => trace!("pixel payload still shared, not pooled"),
        }
    }

    /// Total idle bytes currently shelved.
    pub fn size(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every idle buffer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.shelves.clear();
        inner.total_bytes = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_returns_released_buffer() {
        let pool = BitmapPool::new(1024);

        assert!(pool.acquire(64).is_none());

        pool.release(BytesMut::from(&[7u8; 64][..]));
        assert_eq!(pool.size(), 64);

        let buffer = pool.acquire(64).unwrap();
        assert_eq!(buffer.len(), 64);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_length_must_match_exactly() {
        let pool = BitmapPool::new(1024);
        pool.release(BytesMut::from(&[0u8; 64][..]));
        assert!(pool.acquire(32).is_none());
        assert!(pool.acquire(65).is_none());
        assert!(pool.acquire(64).is_some());
    }

    #[test]
    fn test_capacity_bound() {
        let pool = BitmapPool::new(100);
        pool.release(BytesMut::from(&[0u8; 60][..]));
        pool.release(BytesMut::from(&[0u8; 60][..]));
        // Second release exceeds capacity and is dropped
        assert_eq!(pool.size(), 60);
    }

    #[test]
    fn test_disabled_pool() {
        let pool = BitmapPool::disabled();
        pool.release(BytesMut::from(&[0u8; 16][..]));
        assert_eq!(pool.size(), 0);
        assert!(pool.acquire(16).is_none());
    }

    #[test]
    fn test_release_bytes_unique_payload() {
        let pool = BitmapPool::new(1024);
        let pixels = Bytes::from(vec![1u8; 64]);
        pool.release_bytes(pixels);
        assert_eq!(pool.size(), 64);
    }

    #[test]
    fn test_release_bytes_shared_payload_dropped() {
        let pool = BitmapPool::new(1024);
        let pixels = Bytes::from(vec![1u8; 64]);
        let _clone = pixels.clone();
        pool.release_bytes(pixels);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_byte_len_for() {
        assert_eq!(BitmapPool::byte_len_for(IntSize::new(10, 5)), 200);
        assert_eq!(BitmapPool::byte_len_for(IntSize::new(0, 5)), 0);
    }

    #[test]
    fn test_clear() {
        let pool = BitmapPool::new(1024);
        pool.release(BytesMut::from(&[0u8; 64][..]));
        pool.clear();
        assert_eq!(pool.size(), 0);
        assert!(pool.acquire(64).is_none());
    }

    #[test]
    fn test_lifo_reuse() {
        let pool = BitmapPool::new(1024);
        let mut first = BytesMut::from(&[0u8; 8][..]);
        first[0] = 1;
        let mut second = BytesMut::from(&[0u8; 8][..]);
        second[0] = 2;

        pool.release(first);
        pool.release(second);

        // Most recently released comes back first (warm buffer)
        assert_eq!(pool.acquire(8).unwrap()[0], 2);
        assert_eq!(pool.acquire(8).unwrap()[0], 1);
    }
}
