//! Region decoding: the capability gate and the decoder seam.
//!
//! Region decoding is a platform capability, not something this engine
//! implements itself: the [`RegionDecoder`] trait abstracts whatever
//! primitive the platform offers, and [`SoftwareRegionDecoder`] is the
//! built-in fallback over the `image` crate. The capability gate is
//! checked before any grid work so unsupported formats fail fast.

mod pool;
mod software;

pub use pool::{can_use_subsampling_by_aspect_ratio, TileDecoder, DEFAULT_DECODER_POOL_SIZE};
pub use software::{SoftwareRegionDecoder, SoftwareRegionDecoderFactory};

use bytes::{Bytes, BytesMut};

use crate::error::RegionDecodeError;
use crate::geom::IntRect;
use crate::probe::ImageInfo;
use crate::source::ImageSource;

/// Mime types the region decoders of this engine's target platforms can
/// partially decode. Everything else must be decoded wholesale and is
/// therefore rejected for subsampling.
pub const REGION_DECODABLE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Whether a mime type supports region decoding.
pub fn supports_region_decoding(mime_type: &str) -> bool {
    REGION_DECODABLE_MIME_TYPES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(mime_type))
}

/// The output of one region decode: RGBA8 pixels in stored orientation.
#[derive(Debug, Clone)]
pub struct DecodedRegion {
    pub pixels: Bytes,
    pub size: crate::geom::IntSize,
}

/// A handle onto one open decoder for one image.
///
/// `decode_region` takes the source rect in the image's *stored*
/// coordinate space (orientation remapping is the pooled decoder's job)
/// and an optional reuse buffer of exactly the expected output length.
/// Handles are not shared across threads concurrently (the pool checks
/// one out per decode) but they do move between worker threads.
pub trait RegionDecoder: Send {
    /// The stored-space image info this decoder was opened with.
    fn image_info(&self) -> &ImageInfo;

    /// Decode `src_rect` at `sample_size` into RGBA8 pixels.
    fn decode_region(
        &mut self,
        src_rect: IntRect,
        sample_size: u32,
        reuse: Option<BytesMut>,
    ) -> Result<DecodedRegion, RegionDecodeError>;
}

/// Factory for decoder handles; the pooled decoder calls this on pool
/// misses, so it must be cheap to hold and safe to call concurrently.
pub trait RegionDecoderFactory: Send + Sync {
    fn create(
        &self,
        source: &dyn ImageSource,
        image_info: &ImageInfo,
    ) -> Result<Box<dyn RegionDecoder>, RegionDecodeError>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_gate() {
        assert!(supports_region_decoding("image/jpeg"));
        assert!(supports_region_decoding("image/png"));
        assert!(supports_region_decoding("image/webp"));
        assert!(supports_region_decoding("IMAGE/JPEG"));

        assert!(!supports_region_decoding("image/gif"));
        assert!(!supports_region_decoding("image/bmp"));
        assert!(!supports_region_decoding("image/svg+xml"));
        assert!(!supports_region_decoding(""));
    }
}
