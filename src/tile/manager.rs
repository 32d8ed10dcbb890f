//! Tile manager: the viewport-driven decode scheduler.
//!
//! The manager owns the tile grid and the resident tile map. Every
//! viewport change runs one scheduling pass: select the sample size for
//! the current scale, compute the load rectangle, diff the required tile
//! set against resident tiles, dispatch decodes for the missing ones, and
//! retire tiles the viewport has left behind. Results are published as
//! immutable snapshot sets through a watch channel; the draw path only
//! ever reads the latest set and never triggers a decode.
//!
//! # Concurrency
//!
//! All resident-tile bookkeeping happens under one async mutex, the
//! single coordinating context. Decodes run on the blocking pool, capped
//! by a semaphore for back-pressure. Cancellation is cooperative: a
//! decode that completes for a tile the viewport no longer needs is
//! discarded and its buffer freed, never published.
//!
//! # Retirement
//!
//! A tile that leaves the load rect survives one extra pass before its
//! bitmap is freed (hysteresis against pan jitter). When the sample size
//! changes, loaded tiles of other levels are kept and republished as
//! background until the new level fully covers the load rect, so zooming
//! shows coarse pixels instead of holes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, warn};

use crate::bitmap::{
    tile_bitmap_key, BitmapFrom, BitmapPool, CacheHelper, CacheTileBitmap, TileBitmap,
};
use crate::config::TileAnimation;
use crate::decode::TileDecoder;
use crate::geom::{image_load_rect, sample_size_for_scale, IntRect, IntSize};
use crate::probe::ImageInfo;

use super::grid::{calculate_tile_grid_map, tile_grid_size_map};
use super::{Tile, TileSnapshot, TileState};

/// Passes a tile may sit outside the load rect before its bitmap is freed.
const STALE_PASS_LIMIT: u8 = 2;

// =============================================================================
// Snapshot set
// =============================================================================

/// The published drawing state: everything the draw path needs, immutable.
#[derive(Debug, Clone, Default)]
pub struct TileSnapshotSet {
    /// Sample size of the foreground level.
    pub sample_size: u32,

    /// Region of original-image space tiles are being loaded for.
    pub image_load_rect: IntRect,

    /// Tiles of the current level overlapping the load rect, in grid order.
    pub foreground: Vec<TileSnapshot>,

    /// Loaded tiles of other levels, coarsest first, drawn under the
    /// foreground while it fills in.
    pub background: Vec<TileSnapshot>,
}

// =============================================================================
// Internal state
// =============================================================================

type TileKey = (u32, i32, i32);

fn tile_key(tile: &Tile) -> TileKey {
    (tile.sample_size, tile.coord.col, tile.coord.row)
}

struct TileRuntime {
    tile: Tile,
    state: TileState,
    bitmap: Option<TileBitmap>,
    cache_handle: Option<CacheTileBitmap>,
    from: BitmapFrom,
    loaded_at: Option<Instant>,
    stale_passes: u8,
    /// Generation the last error was latched under; errors are retried
    /// only once the viewport (and so the generation) has moved on.
    error_generation: u64,
}

impl TileRuntime {
    fn new(tile: Tile) -> Self {
        Self {
            tile,
            state: TileState::Initial,
            bitmap: None,
            cache_handle: None,
            from: BitmapFrom::Local,
            loaded_at: None,
            stale_passes: 0,
            error_generation: 0,
        }
    }
}

struct ManagerState {
    tiles: HashMap<TileKey, TileRuntime>,
    sample_size: u32,
    load_rect: IntRect,
    generation: u64,
    destroyed: bool,
}

struct ManagerShared {
    image_info: ImageInfo,
    content_size: IntSize,
    preferred_tile_size: IntSize,
    grid: BTreeMap<u32, Vec<Tile>>,
    decoder: Arc<TileDecoder>,
    cache: CacheHelper,
    pool: Arc<BitmapPool>,
    semaphore: Arc<Semaphore>,
    animation: Option<TileAnimation>,
    state: Mutex<ManagerState>,
    snapshot_tx: watch::Sender<TileSnapshotSet>,
}

// =============================================================================
// TileManager
// =============================================================================

/// Viewport-driven scheduler over one image's tile grid.
pub struct TileManager {
    shared: Arc<ManagerShared>,
}

impl TileManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        decoder: Arc<TileDecoder>,
        content_size: IntSize,
        preferred_tile_size: IntSize,
        footprint_ceiling: IntSize,
        cache: CacheHelper,
        pool: Arc<BitmapPool>,
        max_concurrent_decodes: usize,
        animation: Option<TileAnimation>,
    ) -> Self {
        let grid = calculate_tile_grid_map(
            decoder.image_info().applied_size(),
            preferred_tile_size,
            footprint_ceiling,
        );
        let (snapshot_tx, _) = watch::channel(TileSnapshotSet::default());

        Self {
            shared: Arc::new(ManagerShared {
                image_info: decoder.image_info().clone(),
                content_size,
                preferred_tile_size,
                grid,
                decoder,
                cache,
                pool,
                semaphore: Arc::new(Semaphore::new(max_concurrent_decodes.max(1))),
                animation,
                state: Mutex::new(ManagerState {
                    tiles: HashMap::new(),
                    sample_size: 0,
                    load_rect: IntRect::ZERO,
                    generation: 0,
                    destroyed: false,
                }),
                snapshot_tx,
            }),
        }
    }

    pub fn image_info(&self) -> &ImageInfo {
        &self.shared.image_info
    }

    /// `sample_size -> (cols, rows)` summary of the grid.
    pub fn tile_grid_size_map(&self) -> BTreeMap<u32, (i32, i32)> {
        tile_grid_size_map(&self.shared.grid)
    }

    /// Subscribe to published snapshot sets.
    pub fn snapshots(&self) -> watch::Receiver<TileSnapshotSet> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Run one scheduling pass for the given viewport.
    ///
    /// `scale` is the zoom factor relative to the content (thumbnail)
    /// size; `content_visible_rect` is the content-space region under the
    /// viewport. Cheap when nothing changed; never blocks on decoding.
    pub async fn refresh(&self, scale: f32, content_visible_rect: IntRect) {
        let shared = &self.shared;
        let Some((&max_sample, _)) = shared.grid.iter().last() else {
            return;
        };

        let applied_size = shared.image_info.applied_size();
        let sample_size =
            sample_size_for_scale(applied_size, shared.content_size, scale).min(max_sample);
        let load_rect = image_load_rect(
            applied_size,
            shared.content_size,
            shared.preferred_tile_size,
            content_visible_rect,
        );

        let mut to_spawn: Vec<Tile> = Vec::new();
        {
            let mut state = shared.state.lock().await;
            if state.destroyed {
                return;
            }

            if state.sample_size != sample_size || state.load_rect != load_rect {
                state.generation = state.generation.wrapping_add(1);
            }
            state.sample_size = sample_size;
            state.load_rect = load_rect;
            let generation = state.generation;

            let required: Vec<Tile> = shared.grid[&sample_size]
                .iter()
                .filter(|t| t.src_rect.overlaps(&load_rect))
                .copied()
                .collect();

            // Schedule pass: make sure every required tile is resident and
            // either loaded or loading.
            for tile in &required {
                let runtime = state
                    .tiles
                    .entry(tile_key(tile))
                    .or_insert_with(|| TileRuntime::new(*tile));
                runtime.stale_passes = 0;
                match runtime.state {
                    TileState::Loaded | TileState::Loading => {}
                    TileState::Error if runtime.error_generation == generation => {
                        // Latched: no automatic retry within this viewport
                    }
                    TileState::Initial | TileState::Error => {
                        runtime.state = TileState::Loading;
                        to_spawn.push(*tile);
                    }
                }
            }

            let foreground_covered = required
                .iter()
                .all(|t| {
                    state
                        .tiles
                        .get(&tile_key(t))
                        .map(|rt| rt.state == TileState::Loaded)
                        .unwrap_or(false)
                });

            // Retirement pass
            let pool = &shared.pool;
            state.tiles.retain(|key, runtime| {
                let same_level = key.0 == sample_size;
                let in_rect = runtime.tile.src_rect.overlaps(&load_rect);

                if same_level && in_rect {
                    return true;
                }

                if !same_level {
                    // Background tile: survives while it papers over holes
                    // in the still-loading foreground level
                    if runtime.state == TileState::Loaded && in_rect && !foreground_covered {
                        return true;
                    }
                    free_runtime(pool, runtime);
                    return false;
                }

                // Same level, outside the load rect: hysteresis
                runtime.stale_passes += 1;
                if runtime.stale_passes >= STALE_PASS_LIMIT {
                    free_runtime(pool, runtime);
                    false
                } else {
                    true
                }
            });

            publish_locked(shared, &state);
        }

        for tile in to_spawn {
            spawn_decode(shared.clone(), tile);
        }
    }

    /// Tear down: free every resident tile, publish an empty snapshot set,
    /// and destroy the decoder. Safe to call while decodes are mid-flight;
    /// their results are discarded. Idempotent.
    pub async fn destroy(&self) {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock().await;
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.generation = state.generation.wrapping_add(1);

            for (_, mut runtime) in state.tiles.drain() {
                free_runtime(&shared.pool, &mut runtime);
            }
            state.load_rect = IntRect::ZERO;
            shared.snapshot_tx.send_replace(TileSnapshotSet::default());
        }
        shared.decoder.destroy();
        debug!(image = shared.decoder.image_key(), "tile manager destroyed");
    }
}

// =============================================================================
// Decode task
// =============================================================================

fn spawn_decode(shared: Arc<ManagerShared>, tile: Tile) {
    tokio::spawn(async move {
        let Ok(permit) = shared.semaphore.clone().acquire_owned().await else {
            return;
        };
        let key = tile_key(&tile);

        // The viewport may have moved while we queued on the semaphore.
        // Hand the tile back to Initial so a later pass can re-dispatch it.
        {
            let mut state = shared.state.lock().await;
            if state.destroyed {
                return;
            }
            if !is_wanted(&state, &tile) {
                if let Some(runtime) = state.tiles.get_mut(&key) {
                    if runtime.state == TileState::Loading {
                        runtime.state = TileState::Initial;
                    }
                }
                return;
            }
        }

        let cache_key =
            tile_bitmap_key(shared.decoder.image_key(), tile.sample_size, tile.src_rect);

        // Memory cache first: a hit skips the decode entirely
        if let Some(hit) = shared.cache.get(&cache_key).await {
            let mut state = shared.state.lock().await;
            if state.destroyed {
                return;
            }
            let wanted = is_wanted(&state, &tile);
            let mut published = false;
            if let Some(runtime) = state.tiles.get_mut(&key) {
                if wanted && runtime.state == TileState::Loading {
                    hit.set_is_displayed(true);
                    runtime.state = TileState::Loaded;
                    runtime.bitmap = Some(hit.bitmap().clone());
                    runtime.cache_handle = Some(hit);
                    runtime.from = BitmapFrom::MemoryCache;
                    runtime.loaded_at = Some(Instant::now());
                    published = true;
                } else if runtime.state == TileState::Loading {
                    runtime.state = TileState::Initial;
                }
            }
            if published {
                publish_locked(&shared, &state);
            }
            return;
        }

        // Decode on the blocking pool; region decoding is synchronous
        // I/O + CPU and must stay off the async workers
        let decoder = shared.decoder.clone();
        let pool = shared.pool.clone();
        let src_rect = tile.src_rect;
        let sample_size = tile.sample_size;
        let result =
            tokio::task::spawn_blocking(move || decoder.decode(src_rect, sample_size, &pool))
                .await;
        drop(permit);

        let decoded = match result {
            Ok(decode_result) => decode_result,
            Err(join_error) => Err(crate::error::RegionDecodeError::Decode {
                message: join_error.to_string(),
            }),
        };

        match decoded {
            Ok(bitmap) => {
                // Cache before taking the state lock; an unwanted tile is
                // still a useful cache entry
                let cache_handle = shared
                    .cache
                    .put(
                        &cache_key,
                        bitmap.clone(),
                        shared.decoder.image_key(),
                        &shared.image_info,
                        false,
                    )
                    .await;

                let mut state = shared.state.lock().await;
                if state.destroyed {
                    shared.pool.release_bytes(bitmap.pixels);
                    return;
                }
                let wanted = is_wanted(&state, &tile);
                let mut published = false;
                match state.tiles.get_mut(&key) {
                    Some(runtime) if wanted && runtime.state == TileState::Loading => {
                        if let Some(handle) = &cache_handle {
                            handle.set_is_displayed(true);
                        }
                        runtime.state = TileState::Loaded;
                        runtime.bitmap = Some(bitmap);
                        runtime.cache_handle = cache_handle;
                        runtime.from = BitmapFrom::Local;
                        runtime.loaded_at = Some(Instant::now());
                        published = true;
                    }
                    Some(runtime) => {
                        // Completed for a viewport that moved on: discard
                        if runtime.state == TileState::Loading {
                            runtime.state = TileState::Initial;
                        }
                        shared.pool.release_bytes(bitmap.pixels);
                    }
                    None => {
                        shared.pool.release_bytes(bitmap.pixels);
                    }
                }
                if published {
                    publish_locked(&shared, &state);
                }
            }
            Err(error) => {
                let mut state = shared.state.lock().await;
                if state.destroyed {
                    return;
                }
                let generation = state.generation;
                let mut published = false;
                if let Some(runtime) = state.tiles.get_mut(&key) {
                    warn!(
                        image = shared.decoder.image_key(),
                        tile = %tile.coord,
                        sample_size,
                        error = %error,
                        "tile decode failed"
                    );
                    runtime.state = TileState::Error;
                    runtime.error_generation = generation;
                    runtime.bitmap = None;
                    published = true;
                }
                if published {
                    publish_locked(&shared, &state);
                }
            }
        }
    });
}

/// Whether the tile still belongs to the current required set.
fn is_wanted(state: &ManagerState, tile: &Tile) -> bool {
    state.sample_size == tile.sample_size && tile.src_rect.overlaps(&state.load_rect)
}

// =============================================================================
// Freeing and publishing
// =============================================================================

/// Release a runtime tile's resources: balance the display refcount and
/// hand the pixel buffer back to the reuse pool when nothing else shares
/// it (the cache keeps its own clone alive either way).
fn free_runtime(pool: &BitmapPool, runtime: &mut TileRuntime) {
    let disallow_reuse = runtime
        .cache_handle
        .as_ref()
        .map(|h| h.disallow_reuse())
        .unwrap_or(false);
    if let Some(handle) = runtime.cache_handle.take() {
        handle.set_is_displayed(false);
    }
    if let Some(bitmap) = runtime.bitmap.take() {
        if !disallow_reuse {
            pool.release_bytes(bitmap.pixels);
        }
    }
    runtime.state = TileState::Initial;
    runtime.loaded_at = None;
}

fn snapshot_of(runtime: &TileRuntime, now: Instant, animation: Option<TileAnimation>) -> TileSnapshot {
    let alpha = match (runtime.state, runtime.loaded_at, animation) {
        // Cache hits were on screen before; no fade
        (TileState::Loaded, Some(loaded_at), Some(spec))
            if runtime.from == BitmapFrom::Local =>
        {
            let elapsed = now.saturating_duration_since(loaded_at).as_millis() as u64;
            if spec.duration_ms == 0 {
                255
            } else {
                ((elapsed.min(spec.duration_ms) * 255) / spec.duration_ms) as u8
            }
        }
        _ => 255,
    };

    TileSnapshot {
        tile: runtime.tile,
        state: runtime.state,
        bitmap: if runtime.state == TileState::Loaded {
            runtime.bitmap.clone()
        } else {
            None
        },
        alpha,
        from: runtime.from,
    }
}

/// Rebuild and publish the snapshot set from the current state.
fn publish_locked(shared: &ManagerShared, state: &ManagerState) {
    let now = Instant::now();
    let mut foreground = Vec::new();
    let mut background = Vec::new();

    for runtime in state.tiles.values() {
        let in_rect = runtime.tile.src_rect.overlaps(&state.load_rect);
        if runtime.tile.sample_size == state.sample_size {
            if in_rect {
                foreground.push(snapshot_of(runtime, now, shared.animation));
            }
        } else if runtime.state == TileState::Loaded && in_rect {
            background.push(snapshot_of(runtime, now, None));
        }
    }

    foreground.sort_by_key(|s| (s.tile.coord.row, s.tile.coord.col));
    // Coarsest levels draw first so finer background tiles cover them
    background.sort_by_key(|s| {
        (
            std::cmp::Reverse(s.tile.sample_size),
            s.tile.coord.row,
            s.tile.coord.col,
        )
    });

    shared.snapshot_tx.send_replace(TileSnapshotSet {
        sample_size: state.sample_size,
        image_load_rect: state.load_rect,
        foreground,
        background,
    });
}

// =============================================================================
// Tests
// =============================================================================
