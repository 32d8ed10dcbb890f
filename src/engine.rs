//! The subsampling engine facade.
//!
//! Wires the whole pipeline together in dependency order: probe the
//! source, validate eligibility, open the pooled tile decoder, and hand
//! everything to the tile manager. Image-level failures surface once,
//! here, as a [`CreateDecoderError`]; after a successful create the only
//! errors left are per-tile and handled internally.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::bitmap::{BitmapPool, CacheHelper, MemoryTileBitmapCache, TileBitmapCache};
use crate::config::EngineOptions;
use crate::decode::{RegionDecoderFactory, SoftwareRegionDecoderFactory, TileDecoder};
use crate::error::{CreateDecoderError, ProbeError};
use crate::geom::{preferred_tile_size, IntRect, IntSize};
use crate::probe::{decode_image_info, ImageInfo};
use crate::source::ImageSource;
use crate::tile::{TileManager, TileSnapshotSet};

/// A ready-to-drive subsampling engine for one image.
///
/// The engine holds the image source by shared reference only; the source
/// must stay valid (reopenable) for the engine's lifetime.
pub struct SubsamplingEngine {
    manager: TileManager,
}

impl std::fmt::Debug for SubsamplingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsamplingEngine").finish_non_exhaustive()
    }
}

impl SubsamplingEngine {
    /// Create an engine with the built-in software region decoder and
    /// (unless disabled) a private memory cache.
    ///
    /// `thumbnail_size` is the content size the viewer displays at base
    /// scale; `container_size` is the viewport, which drives the
    /// preferred tile size.
    pub async fn create(
        source: Arc<dyn ImageSource>,
        thumbnail_size: IntSize,
        container_size: IntSize,
        options: EngineOptions,
    ) -> Result<Self, CreateDecoderError> {
        Self::create_with(
            source,
            thumbnail_size,
            container_size,
            options,
            Arc::new(SoftwareRegionDecoderFactory),
            None,
        )
        .await
    }

    /// Create an engine with a caller-supplied region decoder factory
    /// and/or an external tile bitmap cache (for sharing with an image
    /// loader's cache).
    pub async fn create_with(
        source: Arc<dyn ImageSource>,
        thumbnail_size: IntSize,
        container_size: IntSize,
        options: EngineOptions,
        factory: Arc<dyn RegionDecoderFactory>,
        external_cache: Option<Arc<dyn TileBitmapCache>>,
    ) -> Result<Self, CreateDecoderError> {
        // Probing reads headers synchronously; keep it off the caller's
        // async worker
        let probe_source = source.clone();
        let ignore_exif = options.ignore_exif_orientation;
        let image_info = tokio::task::spawn_blocking(move || {
            decode_image_info(probe_source.as_ref(), ignore_exif)
        })
        .await
        .map_err(|e| {
            ProbeError::InvalidHeader {
                key: source.key().to_string(),
                message: format!("probe task failed: {e}"),
            }
        })??;

        let decoder = Arc::new(TileDecoder::create(
            source,
            image_info,
            thumbnail_size,
            options.aspect_ratio_tolerance,
            factory,
            options.decoder_pool_size,
        )?);

        let cache = if options.disable_memory_cache {
            CacheHelper::new(external_cache, true)
        } else {
            let cache = external_cache.unwrap_or_else(|| {
                Arc::new(MemoryTileBitmapCache::with_capacity(
                    options.memory_cache_capacity,
                ))
            });
            CacheHelper::new(Some(cache), false)
        };

        let pool = Arc::new(if options.disable_bitmap_reuse {
            BitmapPool::disabled()
        } else {
            BitmapPool::new(options.bitmap_pool_capacity)
        });

        let preferred = options
            .preferred_tile_size
            .unwrap_or_else(|| preferred_tile_size(container_size));

        let manager = TileManager::new(
            decoder,
            thumbnail_size,
            preferred,
            options.tile_footprint_ceiling,
            cache,
            pool,
            options.max_concurrent_decodes,
            options.animation,
        );

        Ok(Self { manager })
    }

    pub fn image_info(&self) -> &ImageInfo {
        self.manager.image_info()
    }

    /// `sample_size -> (cols, rows)` summary of the tile grid.
    pub fn tile_grid_size_map(&self) -> BTreeMap<u32, (i32, i32)> {
        self.manager.tile_grid_size_map()
    }

    /// Subscribe to published tile snapshot sets.
    pub fn snapshots(&self) -> watch::Receiver<TileSnapshotSet> {
        self.manager.snapshots()
    }

    /// Run a scheduling pass for the given zoom scale and content-space
    /// visible rect. Never blocks on decoding.
    pub async fn refresh(&self, scale: f32, content_visible_rect: IntRect) {
        self.manager.refresh(scale, content_visible_rect).await;
    }

    /// Tear the engine down, freeing all tiles and decoder handles. Safe
    /// while decodes are in flight; idempotent.
    pub async fn destroy(&self) {
        self.manager.destroy().await;
    }
}
