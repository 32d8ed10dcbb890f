//! # zoomtile
//!
//! A subsampling tile engine for viewing images far larger than can be
//! decoded wholesale into memory (tens of megapixels and up). Instead of
//! decoding the full image, the engine decodes only the region under the
//! viewport, at the sample size the current zoom calls for, and publishes
//! immutable tile snapshots for a drawing layer to composite over the
//! always-present thumbnail.
//!
//! ## Features
//!
//! - **Viewport-driven scheduling**: tiles are decoded lazily as the
//!   viewport pans and zooms, with bounded concurrency and cooperative
//!   cancellation of decodes the viewport has outrun
//! - **Sample-size pyramid**: power-of-two grids built per image so the
//!   decoded resolution always matches the displayed resolution
//! - **Bitmap reuse and caching**: decoded tiles go through a
//!   byte-bounded memory cache with display-aware eviction, and decode
//!   buffers circulate through an explicit reuse pool
//! - **EXIF aware**: tile coordinates live in displayed space; the
//!   engine maps rects and pixels through the stored-orientation
//!   transform on the way in and out of the decoder
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`geom`] - integer geometry, orientation transform, coordinate math
//! - [`source`] - the reopenable byte-stream seam ([`ImageSource`])
//! - [`probe`] - image info probing (dimensions, mime type, EXIF)
//! - [`decode`] - the region decoder seam and the pooled tile decoder
//! - [`bitmap`] - tile bitmaps, reuse pool, and the memory cache
//! - [`tile`] - tile model, grid builder, and the scheduling manager
//! - [`engine`] - the [`SubsamplingEngine`] facade wiring it together
//! - [`config`] - engine options and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zoomtile::{EngineOptions, FileImageSource, IntRect, IntSize, SubsamplingEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(FileImageSource::new("panorama.jpg"));
//!     let engine = SubsamplingEngine::create(
//!         source,
//!         IntSize::new(425, 306),  // thumbnail shown at base scale
//!         IntSize::new(500, 500),  // viewport
//!         EngineOptions::default(),
//!     )
//!     .await
//!     .expect("subsampling not applicable");
//!
//!     let mut snapshots = engine.snapshots();
//!
//!     // On every gesture change: one scheduling pass
//!     engine.refresh(4.0, IntRect::new(100, 80, 228, 176)).await;
//!
//!     // Draw path: read the latest published snapshot set
//!     let set = snapshots.borrow_and_update().clone();
//!     for snapshot in &set.foreground {
//!         let _bitmap = &snapshot.bitmap; // composite at snapshot.tile.src_rect ...
//!     }
//! }
//! ```

pub mod bitmap;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod geom;
pub mod probe;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use bitmap::{
    BitmapFrom, BitmapPool, CacheHelper, CacheTileBitmap, MemoryTileBitmapCache, TileBitmap,
    TileBitmapCache,
};
pub use config::{
    Cli, Command, EngineOptions, TileAnimation, DEFAULT_ASPECT_RATIO_TOLERANCE,
    DEFAULT_MAX_CONCURRENT_DECODES, DEFAULT_TILE_FOOTPRINT_CEILING,
};
pub use decode::{
    can_use_subsampling_by_aspect_ratio, supports_region_decoding, RegionDecoder,
    RegionDecoderFactory, SoftwareRegionDecoder, SoftwareRegionDecoderFactory, TileDecoder,
};
pub use engine::SubsamplingEngine;
pub use error::{CreateDecoderError, ProbeError, RegionDecodeError, SourceError};
pub use geom::{
    content_display_rect, content_visible_rect, image_load_rect, preferred_tile_size,
    rotation_quarter_turns, sample_size_for_scale, sampled_bitmap_size_for_region, Alignment,
    ExifOrientation, IntOffset, IntRect, IntSize, ScaleMode,
};
pub use probe::{decode_image_info, ImageInfo};
pub use source::{BytesImageSource, FileImageSource, ImageSource, ImageStream};
pub use tile::{
    calculate_tile_grid_map, tile_grid_size_map, Tile, TileCoord, TileManager, TileSnapshot,
    TileSnapshotSet, TileState,
};
