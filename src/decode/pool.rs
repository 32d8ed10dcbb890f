//! Pooled tile decoder.
//!
//! Opening a decoder handle is expensive (the software fallback decodes
//! the whole frame), so [`TileDecoder`] keeps a small pool of open handles
//! and checks one out per tile decode. Several tiles of the same image can
//! decode concurrently, each on its own handle.
//!
//! The tile grid lives in *displayed* (orientation-applied) coordinates;
//! this is where the mapping to and from stored coordinates happens: the
//! source rect is pulled back through the inverse orientation transform
//! before the decode, and the decoded pixels are pushed forward through
//! the orientation transform after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bitmap::{tile_bitmap_key, BitmapPool, TileBitmap};
use crate::error::{CreateDecoderError, RegionDecodeError};
use crate::geom::{sampled_bitmap_size_for_region, IntRect, IntSize};
use crate::probe::ImageInfo;
use crate::source::ImageSource;

use super::{supports_region_decoding, RegionDecoder, RegionDecoderFactory};

/// Default maximum number of idle decoder handles kept open.
pub const DEFAULT_DECODER_POOL_SIZE: usize = 4;

/// Round to two decimals, the granularity of the aspect-ratio gate.
fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Whether a thumbnail's aspect ratio is close enough to the image's for
/// tile and thumbnail coordinates to line up.
///
/// Accepts iff `|width_scale - height_scale|` rounded to two decimals is
/// at most `tolerance` rounded the same way; boundary values pass.
pub fn can_use_subsampling_by_aspect_ratio(
    image_size: IntSize,
    thumbnail_size: IntSize,
    tolerance: f32,
) -> bool {
    if image_size.is_empty() || thumbnail_size.is_empty() {
        return false;
    }
    let width_scale = image_size.width as f32 / thumbnail_size.width as f32;
    let height_scale = image_size.height as f32 / thumbnail_size.height as f32;
    round2((width_scale - height_scale).abs()) <= round2(tolerance)
}

// =============================================================================
// TileDecoder
// =============================================================================

/// Decodes tiles of one image through a pool of region-decoder handles.
pub struct TileDecoder {
    source: Arc<dyn ImageSource>,
    image_info: ImageInfo,
    factory: Arc<dyn RegionDecoderFactory>,
    /// Idle handles, reused LIFO so warm handles stay warm.
    handles: Mutex<Vec<Box<dyn RegionDecoder>>>,
    pool_limit: usize,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for TileDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDecoder")
            .field("image_info", &self.image_info)
            .field("pool_limit", &self.pool_limit)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl TileDecoder {
    /// Validate eligibility and create the decoder.
    ///
    /// Checks run in a fixed order (format, thumbnail size, aspect
    /// ratio) so unsupported formats never pay for the size math. All
    /// size checks use the orientation-applied image size, the space the
    /// thumbnail lives in.
    pub fn create(
        source: Arc<dyn ImageSource>,
        image_info: ImageInfo,
        thumbnail_size: IntSize,
        aspect_ratio_tolerance: f32,
        factory: Arc<dyn RegionDecoderFactory>,
        pool_limit: usize,
    ) -> Result<Self, CreateDecoderError> {
        if !supports_region_decoding(&image_info.mime_type) {
            return Err(CreateDecoderError::UnsupportedFormat {
                mime_type: image_info.mime_type.clone(),
            });
        }

        let applied_size = image_info.applied_size();
        if thumbnail_size.width >= applied_size.width
            && thumbnail_size.height >= applied_size.height
        {
            return Err(CreateDecoderError::ThumbnailNotSmaller {
                image_size: applied_size,
                thumbnail_size,
            });
        }

        if !can_use_subsampling_by_aspect_ratio(applied_size, thumbnail_size, aspect_ratio_tolerance)
        {
            let width_scale = applied_size.width as f32 / thumbnail_size.width as f32;
            let height_scale = applied_size.height as f32 / thumbnail_size.height as f32;
            return Err(CreateDecoderError::AspectRatioMismatch {
                image_size: applied_size,
                thumbnail_size,
                difference: round2((width_scale - height_scale).abs()),
                tolerance: aspect_ratio_tolerance,
            });
        }

        Ok(Self {
            source,
            image_info,
            factory,
            handles: Mutex::new(Vec::new()),
            pool_limit: pool_limit.max(1),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn image_info(&self) -> &ImageInfo {
        &self.image_info
    }

    pub fn image_key(&self) -> &str {
        self.source.key()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Decode one tile region.
    ///
    /// `src_rect` is in displayed (orientation-applied) original-image
    /// coordinates. The reuse pool supplies the decode buffer when it has
    /// a matching one; an incompatible buffer triggers exactly one retry
    /// without reuse. Returns [`RegionDecodeError::Destroyed`] after
    /// `destroy`, and [`RegionDecodeError::InvalidSrcRect`] (logged, non
    /// fatal) when the rect was computed against stale bounds.
    pub fn decode(
        &self,
        src_rect: IntRect,
        sample_size: u32,
        reuse_pool: &BitmapPool,
    ) -> Result<TileBitmap, RegionDecodeError> {
        if self.is_destroyed() {
            return Err(RegionDecodeError::Destroyed);
        }

        let orientation = self.image_info.orientation;
        let displayed_size = self.image_info.applied_size();
        let stored_rect = orientation.apply_to_rect(src_rect, displayed_size, true);

        let mut handle = self.checkout()?;

        let stored_out = sampled_bitmap_size_for_region(
            stored_rect.size(),
            sample_size,
            &self.image_info.mime_type,
        );
        let reuse = reuse_pool.acquire(BitmapPool::byte_len_for(stored_out));
        let mut result = handle.decode_region(stored_rect, sample_size, reuse);

        if let Err(RegionDecodeError::IncompatibleReuseBuffer { .. }) = result {
            warn!(
                image = self.image_key(),
                rect = %src_rect,
                "reuse buffer incompatible, retrying without reuse"
            );
            result = handle.decode_region(stored_rect, sample_size, None);
        }

        self.checkin(handle);

        let region = match result {
            Ok(region) => region,
            Err(e @ RegionDecodeError::InvalidSrcRect { .. }) => {
                warn!(image = self.image_key(), error = %e, "stale source rect, tile skipped");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // Remap to displayed orientation; the pre-transform buffer goes
        // straight back to the pool when a new one was allocated.
        let (pixels, size) = orientation.apply_to_pixels(&region.pixels, region.size);
        if !orientation.is_identity() {
            reuse_pool.release_bytes(region.pixels);
        }

        Ok(TileBitmap::new(
            tile_bitmap_key(self.image_key(), sample_size, src_rect),
            size,
            pixels,
        ))
    }

    fn checkout(&self) -> Result<Box<dyn RegionDecoder>, RegionDecodeError> {
        if let Some(handle) = self.handles.lock().pop() {
            return Ok(handle);
        }
        debug!(image = self.image_key(), "opening region decoder handle");
        self.factory.create(self.source.as_ref(), &self.image_info)
    }

    fn checkin(&self, handle: Box<dyn RegionDecoder>) {
        // A handle finishing after destroy() must not repopulate the pool
        if self.is_destroyed() {
            return;
        }
        let mut handles = self.handles.lock();
        if handles.len() < self.pool_limit {
            handles.push(handle);
        }
    }

    /// Number of idle handles currently pooled.
    pub fn idle_handles(&self) -> usize {
        self.handles.lock().len()
    }

    /// Tear down: drain and drop every idle handle. Idempotent; decodes
    /// that are mid-flight finish against their checked-out handle and
    /// then drop it.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = {
            let mut handles = self.handles.lock();
            std::mem::take(&mut *handles)
        };
        debug!(
            image = self.image_key(),
            handles = drained.len(),
            "tile decoder destroyed"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
