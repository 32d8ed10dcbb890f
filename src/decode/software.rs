//! Software region decoder over the `image` crate.
//!
//! The `image` crate has no partial-decode API, so each handle decodes the
//! full frame once on open and serves regions by cropping and subsampling
//! that frame. That trades memory for a dependency-free fallback; true
//! region decoders (hardware or platform codecs) plug in through the same
//! [`RegionDecoder`] trait and pay neither cost. Handles are pooled by
//! [`TileDecoder`](super::TileDecoder) precisely so the full-frame decode
//! happens once per handle rather than once per tile.

use std::io::BufReader;

use bytes::BytesMut;
use image::{ImageReader, RgbaImage};

use crate::error::RegionDecodeError;
use crate::geom::{sampled_bitmap_size_for_region, IntRect};
use crate::probe::ImageInfo;
use crate::source::ImageSource;

use super::{DecodedRegion, RegionDecoder, RegionDecoderFactory};

/// Bytes per RGBA8 pixel.
const BYTES_PER_PIXEL: usize = 4;

/// A region decoder backed by one fully decoded frame.
pub struct SoftwareRegionDecoder {
    info: ImageInfo,
    frame: RgbaImage,
}

impl SoftwareRegionDecoder {
    /// Open the source and decode the full frame.
    pub fn open(
        source: &dyn ImageSource,
        image_info: &ImageInfo,
    ) -> Result<Self, RegionDecodeError> {
        let stream = source.open()?;
        let frame = ImageReader::new(BufReader::new(stream))
            .with_guessed_format()
            .map_err(|e| RegionDecodeError::Decode {
                message: e.to_string(),
            })?
            .decode()
            .map_err(|e| RegionDecodeError::Decode {
                message: e.to_string(),
            })?
            .to_rgba8();

        Ok(Self {
            info: image_info.clone(),
            frame,
        })
    }
}

impl RegionDecoder for SoftwareRegionDecoder {
    fn image_info(&self) -> &ImageInfo {
        &self.info
    }

    fn decode_region(
        &mut self,
        src_rect: IntRect,
        sample_size: u32,
        reuse: Option<BytesMut>,
    ) -> Result<DecodedRegion, RegionDecodeError> {
        // Bounds are validated against the decoder's own frame, not the
        // probed info, so stale caller rects are caught here.
        let frame_size = crate::geom::IntSize::new(
            self.frame.width() as i32,
            self.frame.height() as i32,
        );
        if src_rect.is_empty() || !src_rect.is_within(frame_size) {
            return Err(RegionDecodeError::InvalidSrcRect {
                src_rect,
                image_size: frame_size,
            });
        }

        let out_size =
            sampled_bitmap_size_for_region(src_rect.size(), sample_size, &self.info.mime_type);
        let expected_len = out_size.width as usize * out_size.height as usize * BYTES_PER_PIXEL;

        let mut buffer = match reuse {
            Some(buffer) if buffer.len() != expected_len => {
                return Err(RegionDecodeError::IncompatibleReuseBuffer {
                    buffer_len: buffer.len(),
                    expected_size: out_size,
                    expected_len,
                });
            }
            Some(buffer) => buffer,
            None => BytesMut::zeroed(expected_len),
        };

        let step = sample_size.max(1) as i32;
        let frame_width = self.frame.width() as usize;
        let frame_pixels = self.frame.as_raw();

        // Nearest sampling at the center of each step block; the platform
        // decoders this models do their own filtering.
        for out_y in 0..out_size.height {
            let src_y = (src_rect.top + out_y * step + step / 2).min(src_rect.bottom - 1) as usize;
            for out_x in 0..out_size.width {
                let src_x =
                    (src_rect.left + out_x * step + step / 2).min(src_rect.right - 1) as usize;
                let src = (src_y * frame_width + src_x) * BYTES_PER_PIXEL;
                let dst =
                    (out_y as usize * out_size.width as usize + out_x as usize) * BYTES_PER_PIXEL;
                buffer[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&frame_pixels[src..src + BYTES_PER_PIXEL]);
            }
        }

        Ok(DecodedRegion {
            pixels: buffer.freeze(),
            size: out_size,
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Factory producing [`SoftwareRegionDecoder`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRegionDecoderFactory;

impl RegionDecoderFactory for SoftwareRegionDecoderFactory {
    fn create(
        &self,
        source: &dyn ImageSource,
        image_info: &ImageInfo,
    ) -> Result<Box<dyn RegionDecoder>, RegionDecodeError> {
        Ok(Box::new(SoftwareRegionDecoder::open(source, image_info)?))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{ExifOrientation, IntSize};
    use crate::source::BytesImageSource;
    use image::codecs::png::PngEncoder;
    use image::{ImageEncoder, Rgba};

    /// A PNG whose red channel encodes the x coordinate and green channel
    /// the y coordinate, so decoded regions are easy to verify.
    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        });
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
        buf
    }

    fn open_decoder(width: u32, height: u32) -> SoftwareRegionDecoder {
        let source = BytesImageSource::new("mem://grad.png", gradient_png(width, height));
        let info = ImageInfo::new(
            IntSize::new(width as i32, height as i32),
            "image/png",
            ExifOrientation::NORMAL,
        );
        SoftwareRegionDecoder::open(&source, &info).unwrap()
    }

    #[test]
    fn test_full_resolution_region() {
        let mut decoder = open_decoder(64, 64);
        let region = decoder
            .decode_region(IntRect::new(8, 16, 24, 32), 1, None)
            .unwrap();
        assert_eq!(region.size, IntSize::new(16, 16));

        // Top-left pixel of the region is source pixel (8,16)
        assert_eq!(region.pixels[0], 8);
        assert_eq!(region.pixels[1], 16);
        // Bottom-right pixel is source pixel (23,31)
        let last = region.pixels.len() - BYTES_PER_PIXEL;
        assert_eq!(region.pixels[last], 23);
        assert_eq!(region.pixels[last + 1], 31);
    }

    #[test]
    fn test_subsampled_region_size() {
        let mut decoder = open_decoder(64, 64);
        // PNG floors: 30/4 = 7
        let region = decoder
            .decode_region(IntRect::new(0, 0, 30, 30), 4, None)
            .unwrap();
        assert_eq!(region.size, IntSize::new(7, 7));
    }

    #[test]
    fn test_out_of_bounds_rect() {
        let mut decoder = open_decoder(32, 32);
        let result = decoder.decode_region(IntRect::new(0, 0, 33, 32), 1, None);
        assert!(matches!(
            result,
            Err(RegionDecodeError::InvalidSrcRect { .. })
        ));

        let result = decoder.decode_region(IntRect::new(10, 10, 10, 20), 1, None);
        assert!(matches!(
            result,
            Err(RegionDecodeError::InvalidSrcRect { .. })
        ));
    }

    #[test]
    fn test_reuse_buffer_roundtrip() {
        let mut decoder = open_decoder(32, 32);
        let reuse = BytesMut::zeroed(16 * 16 * BYTES_PER_PIXEL);
        let region = decoder
            .decode_region(IntRect::new(0, 0, 16, 16), 1, Some(reuse))
            .unwrap();
        assert_eq!(region.size, IntSize::new(16, 16));
        assert_eq!(region.pixels[0], 0);
    }

    #[test]
    fn test_incompatible_reuse_buffer() {
        let mut decoder = open_decoder(32, 32);
        let reuse = BytesMut::zeroed(10);
        let result = decoder.decode_region(IntRect::new(0, 0, 16, 16), 1, Some(reuse));
        assert!(matches!(
            result,
            Err(RegionDecodeError::IncompatibleReuseBuffer { .. })
        ));
    }
}
