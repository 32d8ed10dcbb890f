use thiserror::Error;

use crate::geom::{IntRect, IntSize};

/// Errors that can occur when opening or reading an image source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The underlying stream could not be opened
    #[error("Failed to open source '{key}': {message}")]
    Open { key: String, message: String },

    /// The stream was opened but reading from it failed
    #[error("Read error in source '{key}': {message}")]
    Read { key: String, message: String },
}

/// Errors related to probing image info (dimensions, mime type, orientation)
///
/// A probe failure is fatal for the image source: it is surfaced once and
/// no further subsampling attempts are made until a new source is set.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// I/O error while reading the source
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// No decoder recognizes the container format
    #[error("Unrecognized image format in source '{key}'")]
    UnrecognizedFormat { key: String },

    /// The container was recognized but its header could not be parsed
    #[error("Invalid image header in source '{key}': {message}")]
    InvalidHeader { key: String, message: String },
}

/// Errors that can occur when creating a tile decoder for an image.
///
/// The three validation failures are checked in a fixed order: format first
/// (so no grid work is wasted on unsupported formats), then thumbnail size,
/// then aspect ratio.
#[derive(Debug, Clone, Error)]
pub enum CreateDecoderError {
    /// Probing the image info failed
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// The mime type is not supported by the region decoder. Non-skippable:
    /// subsampling is disabled entirely for this image.
    #[error("Unsupported format for region decoding: {mime_type}")]
    UnsupportedFormat { mime_type: String },

    /// The thumbnail is at least as large as the original image, so
    /// subsampling is simply not needed. Skippable.
    #[error(
        "Thumbnail size {thumbnail_size} is not smaller than image size {image_size}, \
         subsampling not needed"
    )]
    ThumbnailNotSmaller {
        image_size: IntSize,
        thumbnail_size: IntSize,
    },

    /// The thumbnail's aspect ratio diverges from the original by more than
    /// the configured tolerance. Non-skippable: the caller passed a
    /// mismatched thumbnail.
    #[error(
        "Thumbnail {thumbnail_size} aspect ratio differs from image {image_size} \
         by {difference} (tolerance {tolerance})"
    )]
    AspectRatioMismatch {
        image_size: IntSize,
        thumbnail_size: IntSize,
        difference: f32,
        tolerance: f32,
    },
}

impl CreateDecoderError {
    /// Whether this error means "subsampling simply doesn't apply" rather
    /// than a caller bug or unsupported input.
    pub fn is_skippable(&self) -> bool {
        matches!(self, CreateDecoderError::ThumbnailNotSmaller { .. })
    }
}

/// Errors that can occur when decoding a region of the original image.
///
/// These are tile-level and transient: one bad tile never prevents its
/// siblings from loading.
#[derive(Debug, Clone, Error)]
pub enum RegionDecodeError {
    /// I/O error while reading the source
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The requested source rectangle falls outside the decoder's bounds.
    /// Usually means the caller's grid was computed against stale bounds.
    #[error("Source rect {src_rect} is outside image bounds {image_size}")]
    InvalidSrcRect {
        src_rect: IntRect,
        image_size: IntSize,
    },

    /// The supplied reuse buffer is not compatible with the decode output.
    /// Callers retry once without a reuse buffer on this error.
    #[error(
        "Reuse buffer of {buffer_len} bytes is incompatible with decode output \
         {expected_size} ({expected_len} bytes)"
    )]
    IncompatibleReuseBuffer {
        buffer_len: usize,
        expected_size: IntSize,
        expected_len: usize,
    },

    /// The codec failed to decode the region
    #[error("Decode failed: {message}")]
    Decode { message: String },

    /// The decoder has been destroyed; no further decodes are possible
    #[error("Decoder has been destroyed")]
    Destroyed,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_classification() {
        let not_smaller = CreateDecoderError::ThumbnailNotSmaller {
            image_size: IntSize::new(100, 100),
            thumbnail_size: IntSize::new(200, 200),
        };
        assert!(not_smaller.is_skippable());

        let unsupported = CreateDecoderError::UnsupportedFormat {
            mime_type: "image/gif".to_string(),
        };
        assert!(!unsupported.is_skippable());

        let mismatch = CreateDecoderError::AspectRatioMismatch {
            image_size: IntSize::new(1000, 500),
            thumbnail_size: IntSize::new(100, 100),
            difference: 5.0,
            tolerance: 0.5,
        };
        assert!(!mismatch.is_skippable());
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = RegionDecodeError::InvalidSrcRect {
            src_rect: IntRect::new(0, 0, 10, 10),
            image_size: IntSize::new(5, 5),
        };
        assert!(err.to_string().contains("outside image bounds"));

        let err = CreateDecoderError::UnsupportedFormat {
            mime_type: "image/gif".to_string(),
        };
        assert!(err.to_string().contains("image/gif"));
    }
}
