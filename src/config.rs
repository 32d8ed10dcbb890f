//! Engine options and CLI configuration.
//!
//! Every empirically chosen constant of the engine (the tile footprint
//! ceiling, the aspect-ratio tolerance, pool sizes, the fade-in window)
//! is a field on [`EngineOptions`] rather than a hard-coded value, with
//! defaults matching the observed production behavior.
//!
//! The CLI config mirrors the library options where they matter for the
//! diagnostics commands. All CLI options can also come from environment
//! variables with the `ZOOMTILE_` prefix.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bitmap::{DEFAULT_BITMAP_POOL_CAPACITY, DEFAULT_MEMORY_CACHE_CAPACITY};
use crate::decode::DEFAULT_DECODER_POOL_SIZE;
use crate::geom::IntSize;

// =============================================================================
// Default Values
// =============================================================================

/// Default cap on a tile's decoded pixel footprint, per axis. Matches the
/// common GPU texture / platform decoder limit.
pub const DEFAULT_TILE_FOOTPRINT_CEILING: IntSize = IntSize::new(4096, 4096);

/// Default aspect-ratio divergence tolerance between image and thumbnail.
pub const DEFAULT_ASPECT_RATIO_TOLERANCE: f32 = 0.5;

/// Default cap on concurrent in-flight tile decodes.
pub const DEFAULT_MAX_CONCURRENT_DECODES: usize = 4;

/// Default tile fade-in duration in milliseconds.
pub const DEFAULT_TILE_ANIMATION_DURATION_MS: u64 = 200;

// =============================================================================
// TileAnimation
// =============================================================================

/// Fade-in parameters for freshly decoded tiles.
///
/// Snapshots ramp their alpha from 0 to 255 over the duration; cache hits
/// skip the fade since they were on screen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAnimation {
    pub duration_ms: u64,
}

impl Default for TileAnimation {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_TILE_ANIMATION_DURATION_MS,
        }
    }
}

// =============================================================================
// EngineOptions
// =============================================================================

/// Tunables for one subsampling engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Preferred tile size; derived from the container (half per axis)
    /// when not set.
    pub preferred_tile_size: Option<IntSize>,

    /// Per-axis cap on a tile's decoded pixel footprint.
    pub tile_footprint_ceiling: IntSize,

    /// Maximum accepted `|width_scale - height_scale|` between image and
    /// thumbnail, compared at two-decimal precision.
    pub aspect_ratio_tolerance: f32,

    /// Maximum idle region-decoder handles kept open.
    pub decoder_pool_size: usize,

    /// Cap on concurrent in-flight tile decodes.
    pub max_concurrent_decodes: usize,

    /// Byte capacity of the built-in tile bitmap memory cache.
    pub memory_cache_capacity: usize,

    /// Byte capacity of the pixel-buffer reuse pool.
    pub bitmap_pool_capacity: usize,

    /// Disable tile bitmap caching (every tile decodes directly).
    pub disable_memory_cache: bool,

    /// Disable pixel-buffer reuse (every decode allocates fresh).
    pub disable_bitmap_reuse: bool,

    /// Force normal orientation even when the image carries an EXIF tag.
    /// Use when the thumbnail was produced without orientation correction.
    pub ignore_exif_orientation: bool,

    /// Tile fade-in; `None` publishes everything fully opaque.
    pub animation: Option<TileAnimation>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            preferred_tile_size: None,
            tile_footprint_ceiling: DEFAULT_TILE_FOOTPRINT_CEILING,
            aspect_ratio_tolerance: DEFAULT_ASPECT_RATIO_TOLERANCE,
            decoder_pool_size: DEFAULT_DECODER_POOL_SIZE,
            max_concurrent_decodes: DEFAULT_MAX_CONCURRENT_DECODES,
            memory_cache_capacity: DEFAULT_MEMORY_CACHE_CAPACITY,
            bitmap_pool_capacity: DEFAULT_BITMAP_POOL_CAPACITY,
            disable_memory_cache: false,
            disable_bitmap_reuse: false,
            ignore_exif_orientation: false,
            animation: Some(TileAnimation::default()),
        }
    }
}

impl EngineOptions {
    /// Validate the options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_footprint_ceiling.is_empty() {
            return Err("tile_footprint_ceiling must be positive on both axes".to_string());
        }
        if let Some(size) = self.preferred_tile_size {
            if size.is_empty() {
                return Err("preferred_tile_size must be positive on both axes".to_string());
            }
        }
        if self.aspect_ratio_tolerance < 0.0 {
            return Err("aspect_ratio_tolerance must not be negative".to_string());
        }
        if self.decoder_pool_size == 0 {
            return Err("decoder_pool_size must be greater than 0".to_string());
        }
        if self.max_concurrent_decodes == 0 {
            return Err("max_concurrent_decodes must be greater than 0".to_string());
        }
        if !self.disable_memory_cache && self.memory_cache_capacity == 0 {
            return Err(
                "memory_cache_capacity must be greater than 0 (or disable the cache)".to_string(),
            );
        }
        Ok(())
    }
}

// =============================================================================
// CLI
// =============================================================================

/// zoomtile - diagnostics for the subsampling tile engine.
#[derive(Parser, Debug)]
#[command(name = "zoomtile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe an image: dimensions, mime type, EXIF orientation, and
    /// whether region decoding (and so subsampling) applies.
    Probe(ProbeConfig),

    /// Show the tile grid the engine would build for an image under a
    /// given viewport.
    Grid(GridConfig),
}

#[derive(Parser, Debug)]
pub struct ProbeConfig {
    /// Path to the image file.
    pub file: PathBuf,

    /// Ignore any EXIF orientation tag.
    #[arg(long, default_value_t = false, env = "ZOOMTILE_IGNORE_EXIF")]
    pub ignore_exif_orientation: bool,
}

#[derive(Parser, Debug)]
pub struct GridConfig {
    /// Path to the image file.
    pub file: PathBuf,

    /// Viewport size as WxH.
    #[arg(long, default_value = "500x500", env = "ZOOMTILE_VIEWPORT")]
    pub viewport: String,

    /// Thumbnail (content) size as WxH. Defaults to the image scaled to
    /// fit the viewport.
    #[arg(long, env = "ZOOMTILE_THUMBNAIL")]
    pub thumbnail: Option<String>,

    /// Ignore any EXIF orientation tag.
    #[arg(long, default_value_t = false, env = "ZOOMTILE_IGNORE_EXIF")]
    pub ignore_exif_orientation: bool,
}

/// Parse a `WxH` size argument.
pub fn parse_size(value: &str) -> Result<IntSize, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{value}', expected WxH"))?;
    let width: i32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{value}'"))?;
    let height: i32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{value}'"))?;
    if width <= 0 || height <= 0 {
        return Err(format!("size '{value}' must be positive"));
    }
    Ok(IntSize::new(width, height))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_valid() {
        assert!(EngineOptions::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_options() {
        let mut options = EngineOptions::default();
        options.tile_footprint_ceiling = IntSize::new(0, 4096);
        assert!(options.validate().is_err());

        let mut options = EngineOptions::default();
        options.max_concurrent_decodes = 0;
        assert!(options.validate().is_err());

        let mut options = EngineOptions::default();
        options.aspect_ratio_tolerance = -0.1;
        assert!(options.validate().is_err());

        let mut options = EngineOptions::default();
        options.memory_cache_capacity = 0;
        assert!(options.validate().is_err());
        options.disable_memory_cache = true;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("500x500").unwrap(), IntSize::new(500, 500));
        assert_eq!(parse_size("1920X1080").unwrap(), IntSize::new(1920, 1080));
        assert!(parse_size("500").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("axb").is_err());
    }
}
