//! Pure coordinate transforms between container, content, and origin space.
//!
//! The engine juggles three coordinate spaces: the container (viewport) the
//! image is drawn into, the content (thumbnail) that is always fully
//! decoded, and the origin (full-resolution) image tiles are cut from.
//! Everything here is stateless math used by both the scheduler and the
//! draw path.

use super::{IntRect, IntSize};

// =============================================================================
// Scale mode and alignment
// =============================================================================

/// How content is scaled to the container, mirroring the usual viewer
/// content-scale choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    /// Uniformly scale so the whole content fits inside the container.
    #[default]
    Fit,
    /// Uniformly scale so the content fully covers the container.
    Crop,
    /// Like `Fit`, but never scale up past 1:1.
    Inside,
    /// Non-uniform scale to exactly the container bounds.
    FillBounds,
}

/// Where scaled content sits within the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    TopStart,
    TopCenter,
    TopEnd,
    CenterStart,
    #[default]
    Center,
    CenterEnd,
    BottomStart,
    BottomCenter,
    BottomEnd,
}

impl Alignment {
    /// Offset for placing `inner` within `outer` along one axis.
    /// `which` 0 = start, 1 = center, 2 = end.
    fn offset(which: u8, outer: i32, inner: i32) -> i32 {
        match which {
            0 => 0,
            1 => (outer - inner) / 2,
            _ => outer - inner,
        }
    }

    fn horizontal(&self) -> u8 {
        match self {
            Alignment::TopStart | Alignment::CenterStart | Alignment::BottomStart => 0,
            Alignment::TopCenter | Alignment::Center | Alignment::BottomCenter => 1,
            Alignment::TopEnd | Alignment::CenterEnd | Alignment::BottomEnd => 2,
        }
    }

    fn vertical(&self) -> u8 {
        match self {
            Alignment::TopStart | Alignment::TopCenter | Alignment::TopEnd => 0,
            Alignment::CenterStart | Alignment::Center | Alignment::CenterEnd => 1,
            Alignment::BottomStart | Alignment::BottomCenter | Alignment::BottomEnd => 2,
        }
    }
}

// =============================================================================
// Container <-> content
// =============================================================================

/// The container-space rect the scaled content occupies at base scale.
///
/// May extend outside the container for `Crop`.
pub fn content_display_rect(
    container: IntSize,
    content: IntSize,
    mode: ScaleMode,
    alignment: Alignment,
) -> IntRect {
    if container.is_empty() || content.is_empty() {
        return IntRect::ZERO;
    }

    let width_scale = container.width as f32 / content.width as f32;
    let height_scale = container.height as f32 / content.height as f32;

    let (display_width, display_height) = match mode {
        ScaleMode::Fit => {
            let scale = width_scale.min(height_scale);
            scaled_size(content, scale, scale)
        }
        ScaleMode::Crop => {
            let scale = width_scale.max(height_scale);
            scaled_size(content, scale, scale)
        }
        ScaleMode::Inside => {
            let scale = width_scale.min(height_scale).min(1.0);
            scaled_size(content, scale, scale)
        }
        ScaleMode::FillBounds => (container.width, container.height),
    };

    let left = Alignment::offset(alignment.horizontal(), container.width, display_width);
    let top = Alignment::offset(alignment.vertical(), container.height, display_height);
    IntRect::new(left, top, left + display_width, top + display_height)
}

fn scaled_size(content: IntSize, width_scale: f32, height_scale: f32) -> (i32, i32) {
    (
        (content.width as f32 * width_scale).round() as i32,
        (content.height as f32 * height_scale).round() as i32,
    )
}

/// The content-space region visible through the container at base scale.
pub fn content_visible_rect(
    container: IntSize,
    content: IntSize,
    mode: ScaleMode,
    alignment: Alignment,
) -> IntRect {
    let display = content_display_rect(container, content, mode, alignment);
    if display.is_empty() {
        return IntRect::ZERO;
    }

    let visible = display.intersect(&IntRect::from_size(container));
    if visible.is_empty() {
        return IntRect::ZERO;
    }

    // Map the visible container-space strip back into content coordinates.
    let width_scale = content.width as f32 / display.width() as f32;
    let height_scale = content.height as f32 / display.height() as f32;
    IntRect::new(
        ((visible.left - display.left) as f32 * width_scale).floor() as i32,
        ((visible.top - display.top) as f32 * height_scale).floor() as i32,
        ((visible.right - display.left) as f32 * width_scale).ceil() as i32,
        ((visible.bottom - display.top) as f32 * height_scale).ceil() as i32,
    )
    .clamp_to(content)
}

// =============================================================================
// Content <-> origin
// =============================================================================

/// Map a content-space (thumbnail) rect to original-image space.
///
/// Rounds outward so the mapped rect never loses coverage.
pub fn content_rect_to_origin(
    content_rect: IntRect,
    content_size: IntSize,
    origin_size: IntSize,
) -> IntRect {
    if content_size.is_empty() || origin_size.is_empty() {
        return IntRect::ZERO;
    }
    let width_scale = origin_size.width as f32 / content_size.width as f32;
    let height_scale = origin_size.height as f32 / content_size.height as f32;
    IntRect::new(
        (content_rect.left as f32 * width_scale).floor() as i32,
        (content_rect.top as f32 * height_scale).floor() as i32,
        (content_rect.right as f32 * width_scale).ceil() as i32,
        (content_rect.bottom as f32 * height_scale).ceil() as i32,
    )
    .clamp_to(origin_size)
}

/// Map an original-image-space rect back to content-space, rounding outward.
pub fn origin_rect_to_content(
    origin_rect: IntRect,
    content_size: IntSize,
    origin_size: IntSize,
) -> IntRect {
    if content_size.is_empty() || origin_size.is_empty() {
        return IntRect::ZERO;
    }
    let width_scale = content_size.width as f32 / origin_size.width as f32;
    let height_scale = content_size.height as f32 / origin_size.height as f32;
    IntRect::new(
        (origin_rect.left as f32 * width_scale).floor() as i32,
        (origin_rect.top as f32 * height_scale).floor() as i32,
        (origin_rect.right as f32 * width_scale).ceil() as i32,
        (origin_rect.bottom as f32 * height_scale).ceil() as i32,
    )
    .clamp_to(content_size)
}

/// The original-image-space region that must be covered by tiles for the
/// current viewport: the visible content rect mapped to origin space and
/// expanded by half a preferred tile on every side, clamped to the image.
///
/// The expansion gives panning a loaded ring of tiles to reveal before the
/// scheduler has to catch up.
pub fn image_load_rect(
    image_size: IntSize,
    content_size: IntSize,
    preferred_tile_size: IntSize,
    content_visible_rect: IntRect,
) -> IntRect {
    if content_visible_rect.is_empty() {
        return IntRect::ZERO;
    }
    let origin_rect = content_rect_to_origin(content_visible_rect, content_size, image_size);
    origin_rect
        .expand(preferred_tile_size.width / 2, preferred_tile_size.height / 2)
        .clamp_to(image_size)
}

// =============================================================================
// Sample size
// =============================================================================

/// Select the sample size for the current zoom scale.
///
/// Chooses the largest power of two whose decoded resolution is still at
/// least the displayed resolution (`content * scale`), so tiles are never
/// decoded below screen density and then upsampled blurry. Returns 1 for
/// any scale at or beyond the original resolution.
pub fn sample_size_for_scale(image_size: IntSize, content_size: IntSize, scale: f32) -> u32 {
    if image_size.is_empty() || content_size.is_empty() || scale <= 0.0 {
        return 1;
    }
    let displayed_width = content_size.width as f32 * scale;
    let ratio = image_size.width as f32 / displayed_width;
    if ratio <= 1.0 {
        return 1;
    }
    // Largest power of two not exceeding the ratio
    let mut sample_size = 1u32;
    while (sample_size * 2) as f32 <= ratio {
        sample_size *= 2;
    }
    sample_size
}

/// The pixel size a full decode at `sample_size` produces.
///
/// Same rounding semantics as the region variant.
pub fn sampled_bitmap_size(image_size: IntSize, sample_size: u32, mime_type: &str) -> IntSize {
    sampled_bitmap_size_for_region(image_size, sample_size, mime_type)
}

/// The pixel size a region decode at `sample_size` produces.
///
/// PNG decoders truncate the sampled dimensions (floor); JPEG decoders on
/// the platform API levels this engine models round up (ceiling).
pub fn sampled_bitmap_size_for_region(
    region_size: IntSize,
    sample_size: u32,
    mime_type: &str,
) -> IntSize {
    let sample_size = sample_size.max(1) as f32;
    let width = region_size.width as f32 / sample_size;
    let height = region_size.height as f32 / sample_size;
    if mime_type.eq_ignore_ascii_case("image/png") {
        IntSize::new(width.floor() as i32, height.floor() as i32)
    } else {
        IntSize::new(width.ceil() as i32, height.ceil() as i32)
    }
}

// =============================================================================
// Rotation
// =============================================================================

/// Validate a caller-supplied rotation and reduce it to quarter turns.
///
/// Only exact multiples of 90 degrees are representable; anything else is
/// rejected with `None` and must be surfaced as an argument error.
pub fn rotation_quarter_turns(degrees: i32) -> Option<u8> {
    if degrees % 90 != 0 {
        return None;
    }
    Some((degrees.rem_euclid(360) / 90) as u8)
}

/// The default preferred tile size for a viewport: half the container on
/// each axis, so roughly four tiles cover the screen at any zoom level.
pub fn preferred_tile_size(container: IntSize) -> IntSize {
    IntSize::new(
        (container.width / 2).max(1),
        (container.height / 2).max(1),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_center_display_rect() {
        // Content 425x306 in a 500x500 container at Fit/Center occupies
        // (0,70,500,430).
        let rect = content_display_rect(
            IntSize::new(500, 500),
            IntSize::new(425, 306),
            ScaleMode::Fit,
            Alignment::Center,
        );
        assert_eq!(rect, IntRect::new(0, 70, 500, 430));
    }

    #[test]
    fn test_crop_overflows_container() {
        let rect = content_display_rect(
            IntSize::new(100, 100),
            IntSize::new(200, 100),
            ScaleMode::Crop,
            Alignment::Center,
        );
        assert_eq!(rect, IntRect::new(-50, 0, 150, 100));
    }

    #[test]
    fn test_inside_never_scales_up() {
        let rect = content_display_rect(
            IntSize::new(500, 500),
            IntSize::new(100, 80),
            ScaleMode::Inside,
            Alignment::TopStart,
        );
        assert_eq!(rect, IntRect::new(0, 0, 100, 80));
    }

    #[test]
    fn test_visible_rect_fully_visible_content() {
        // Fit content is fully visible, so the visible rect is the whole
        // content.
        let visible = content_visible_rect(
            IntSize::new(500, 500),
            IntSize::new(425, 306),
            ScaleMode::Fit,
            Alignment::Center,
        );
        assert_eq!(visible, IntRect::from_size(IntSize::new(425, 306)));
    }

    #[test]
    fn test_visible_rect_cropped_content() {
        // 200x100 content cropped into a square container: half the width
        // hangs outside, so the middle vertical band is visible.
        let visible = content_visible_rect(
            IntSize::new(100, 100),
            IntSize::new(200, 100),
            ScaleMode::Crop,
            Alignment::Center,
        );
        assert_eq!(visible, IntRect::new(50, 0, 150, 100));
    }

    #[test]
    fn test_content_to_origin_round_trip_covers() {
        let content = IntSize::new(425, 306);
        let origin = IntSize::new(6799, 4882);
        let rect = IntRect::new(10, 20, 100, 200);

        let origin_rect = content_rect_to_origin(rect, content, origin);
        let back = origin_rect_to_content(origin_rect, content, origin);

        // Outward rounding may grow but never lose coverage
        assert!(back.left <= rect.left);
        assert!(back.top <= rect.top);
        assert!(back.right >= rect.right);
        assert!(back.bottom >= rect.bottom);
    }

    #[test]
    fn test_image_load_rect_expansion_and_clamp() {
        let image = IntSize::new(1000, 1000);
        let content = IntSize::new(100, 100);
        let tile = IntSize::new(200, 200);

        // Visible rect at the content origin: expansion clamps at 0
        let load = image_load_rect(image, content, tile, IntRect::new(0, 0, 50, 50));
        assert_eq!(load, IntRect::new(0, 0, 600, 600));

        let load = image_load_rect(image, content, tile, IntRect::new(50, 50, 100, 100));
        assert_eq!(load, IntRect::new(400, 400, 1000, 1000));
    }

    #[test]
    fn test_sample_size_for_scale() {
        let image = IntSize::new(6799, 4882);
        let content = IntSize::new(425, 306);

        // Base scale 1.0: thumbnail resolution, origin is ~16x denser
        assert_eq!(sample_size_for_scale(image, content, 1.0), 8);
        // Fully zoomed to origin resolution
        assert_eq!(sample_size_for_scale(image, content, 16.0), 1);
        // Intermediate zooms step through the powers of two
        assert_eq!(sample_size_for_scale(image, content, 2.0), 4);
        assert_eq!(sample_size_for_scale(image, content, 4.0), 2);
        // Zoomed beyond origin resolution still decodes at 1
        assert_eq!(sample_size_for_scale(image, content, 64.0), 1);
    }

    #[test]
    fn test_sampled_bitmap_size_for_region() {
        // PNG floors, JPEG ceils.
        let region = IntSize::new(1005, 201);
        assert_eq!(
            sampled_bitmap_size_for_region(region, 2, "image/png"),
            IntSize::new(502, 100)
        );
        assert_eq!(
            sampled_bitmap_size_for_region(region, 2, "image/jpeg"),
            IntSize::new(503, 101)
        );
        assert_eq!(
            sampled_bitmap_size_for_region(region, 1, "image/png"),
            region
        );
    }

    #[test]
    fn test_rotation_validation() {
        assert_eq!(rotation_quarter_turns(0), Some(0));
        assert_eq!(rotation_quarter_turns(90), Some(1));
        assert_eq!(rotation_quarter_turns(180), Some(2));
        assert_eq!(rotation_quarter_turns(270), Some(3));
        assert_eq!(rotation_quarter_turns(360), Some(0));
        assert_eq!(rotation_quarter_turns(-90), Some(3));
        assert_eq!(rotation_quarter_turns(45), None);
        assert_eq!(rotation_quarter_turns(91), None);
    }

    #[test]
    fn test_preferred_tile_size() {
        assert_eq!(
            preferred_tile_size(IntSize::new(500, 500)),
            IntSize::new(250, 250)
        );
        assert_eq!(preferred_tile_size(IntSize::new(1, 1)), IntSize::new(1, 1));
    }
}
