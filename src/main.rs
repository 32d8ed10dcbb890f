//! zoomtile - diagnostics CLI for the subsampling tile engine.
//!
//! `probe` reports what the engine would learn about an image; `grid`
//! shows the tile pyramid it would build for a viewport.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zoomtile::{
    config::{parse_size, Cli, Command, GridConfig, ProbeConfig},
    content_display_rect, content_visible_rect, decode_image_info, preferred_tile_size,
    supports_region_decoding, tile_grid_size_map, Alignment, CreateDecoderError, FileImageSource,
    ImageSource, IntSize, ScaleMode, SoftwareRegionDecoderFactory, TileDecoder,
    DEFAULT_ASPECT_RATIO_TOLERANCE, DEFAULT_TILE_FOOTPRINT_CEILING,
};

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Probe(config) => run_probe(config),
        Command::Grid(config) => run_grid(config),
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zoomtile=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

// =============================================================================
// Probe Command
// =============================================================================

fn run_probe(config: ProbeConfig) -> ExitCode {
    let source = FileImageSource::new(&config.file);

    let image_info = match decode_image_info(&source, config.ignore_exif_orientation) {
        Ok(info) => info,
        Err(e) => {
            error!("Probe failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Source:          {}", source.key());
    info!("Mime type:       {}", image_info.mime_type);
    info!("Stored size:     {}", image_info.size);
    info!(
        "Orientation:     {} (EXIF value)",
        image_info.orientation.exif_value()
    );
    info!("Displayed size:  {}", image_info.applied_size());
    info!(
        "Region decoding: {}",
        if supports_region_decoding(&image_info.mime_type) {
            "supported"
        } else {
            "NOT supported, subsampling disabled for this format"
        }
    );

    ExitCode::SUCCESS
}

// =============================================================================
// Grid Command
// =============================================================================

fn run_grid(config: GridConfig) -> ExitCode {
    let viewport = match parse_size(&config.viewport) {
        Ok(size) => size,
        Err(e) => {
            error!("Invalid --viewport: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source: Arc<dyn ImageSource> = Arc::new(FileImageSource::new(&config.file));
    let image_info = match decode_image_info(source.as_ref(), config.ignore_exif_orientation) {
        Ok(info) => info,
        Err(e) => {
            error!("Probe failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let applied_size = image_info.applied_size();

    // Default thumbnail: the image scaled down to fit the viewport, the
    // size a viewer's placeholder decode would have
    let thumbnail = match &config.thumbnail {
        Some(value) => match parse_size(value) {
            Ok(size) => size,
            Err(e) => {
                error!("Invalid --thumbnail: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => fit_size(applied_size, viewport),
    };

    info!("Image:     {} ({})", applied_size, image_info.mime_type);
    info!("Thumbnail: {}", thumbnail);
    info!("Viewport:  {}", viewport);

    // Same eligibility gate the engine applies
    let decoder = TileDecoder::create(
        source,
        image_info,
        thumbnail,
        DEFAULT_ASPECT_RATIO_TOLERANCE,
        Arc::new(SoftwareRegionDecoderFactory),
        1,
    );
    let decoder = match decoder {
        Ok(decoder) => decoder,
        Err(e @ CreateDecoderError::ThumbnailNotSmaller { .. }) => {
            info!("Subsampling not needed: {}", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Subsampling not applicable: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let grid = zoomtile::calculate_tile_grid_map(
        decoder.image_info().applied_size(),
        preferred_tile_size(viewport),
        DEFAULT_TILE_FOOTPRINT_CEILING,
    );
    if grid.is_empty() {
        info!("No tile levels: the image fits a single preferred tile");
        return ExitCode::SUCCESS;
    }

    info!("");
    info!("Tile grid (preferred tile {}):", preferred_tile_size(viewport));
    info!("  {:>11}  {:>9}  {:>7}", "sample size", "grid", "tiles");
    for (sample_size, (cols, rows)) in tile_grid_size_map(&grid) {
        info!(
            "  {:>11}  {:>4}x{:<4}  {:>7}",
            sample_size,
            cols,
            rows,
            cols * rows
        );
    }

    let display_rect = content_display_rect(viewport, thumbnail, ScaleMode::Fit, Alignment::Center);
    let visible = content_visible_rect(viewport, thumbnail, ScaleMode::Fit, Alignment::Center);
    info!("");
    info!("At Fit scale, Center alignment:");
    info!("  content display rect: {}", display_rect);
    info!("  content visible rect: {}", visible);

    ExitCode::SUCCESS
}

/// Scale `size` down to fit within `bounds`, preserving aspect ratio.
fn fit_size(size: IntSize, bounds: IntSize) -> IntSize {
    if size.fits_within(bounds) {
        return size;
    }
    let scale = (bounds.width as f32 / size.width as f32)
        .min(bounds.height as f32 / size.height as f32);
    IntSize::new(
        (size.width as f32 * scale).round().max(1.0) as i32,
        (size.height as f32 * scale).round().max(1.0) as i32,
    )
}
