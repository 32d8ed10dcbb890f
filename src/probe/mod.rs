//! Image info probing: dimensions, mime type, and EXIF orientation.
//!
//! Probing reads only container headers and the EXIF APP1 segment, never
//! full pixel data, so it is cheap even for enormous images. The result is
//! derived once per [`ImageSource`] and treated as immutable afterwards.

mod exif;

use std::io::BufReader;

use image::ImageReader;

use crate::error::ProbeError;
use crate::geom::{ExifOrientation, IntSize};
use crate::source::ImageSource;

/// Immutable facts about an image, derived once per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Dimensions as stored in the container, before orientation.
    pub size: IntSize,

    /// Mime type, e.g. `image/jpeg`.
    pub mime_type: String,

    /// EXIF orientation. [`ExifOrientation::NORMAL`] when the container
    /// carries no orientation tag or probing was told to ignore it.
    pub orientation: ExifOrientation,
}

impl ImageInfo {
    pub fn new(
        size: IntSize,
        mime_type: impl Into<String>,
        orientation: ExifOrientation,
    ) -> Self {
        Self {
            size,
            mime_type: mime_type.into(),
            orientation,
        }
    }

    /// Dimensions after the orientation transform is applied, the size
    /// the viewer actually displays. Derived, never mutated in place.
    pub fn applied_size(&self) -> IntSize {
        self.orientation.apply_to_size(self.size)
    }
}

/// Maximum prefix read when scanning for the EXIF APP1 segment. The APP1
/// segment is capped at 64KB by the JPEG format and sits directly after
/// SOI in every real-world producer.
const EXIF_SCAN_LIMIT: usize = 256 * 1024;

/// Probe an image source for dimensions, mime type, and orientation.
///
/// With `ignore_exif_orientation` the orientation is forced to normal even
/// if the container carries a tag. Callers whose thumbnail was produced
/// without orientation correction use this to keep the thumbnail and tile
/// coordinate spaces consistent.
pub fn decode_image_info(
    source: &dyn ImageSource,
    ignore_exif_orientation: bool,
) -> Result<ImageInfo, ProbeError> {
    let stream = source.open()?;

    let reader = ImageReader::new(BufReader::new(stream))
        .with_guessed_format()
        .map_err(|e| ProbeError::InvalidHeader {
            key: source.key().to_string(),
            message: e.to_string(),
        })?;

    let format = reader.format().ok_or_else(|| ProbeError::UnrecognizedFormat {
        key: source.key().to_string(),
    })?;
    let mime_type = format.to_mime_type().to_string();

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ProbeError::InvalidHeader {
            key: source.key().to_string(),
            message: e.to_string(),
        })?;
    let size = IntSize::new(width as i32, height as i32);

    let orientation = if ignore_exif_orientation || mime_type != "image/jpeg" {
        // Only JPEG sources carry EXIF here; TIFF-based containers are not
        // region-decodable by this engine anyway.
        ExifOrientation::NORMAL
    } else {
        probe_jpeg_orientation(source)?
    };

    Ok(ImageInfo::new(size, mime_type, orientation))
}

/// Scan the JPEG stream prefix for an EXIF orientation tag.
///
/// A missing or corrupt APP1 segment yields normal orientation, not an
/// error: orientation is advisory metadata.
fn probe_jpeg_orientation(source: &dyn ImageSource) -> Result<ExifOrientation, ProbeError> {
    use std::io::Read;

    let mut stream = source.open()?;
    let mut prefix = vec![0u8; EXIF_SCAN_LIMIT];
    let mut filled = 0;
    loop {
        let n = stream
            .read(&mut prefix[filled..])
            .map_err(|e| crate::error::SourceError::Read {
                key: source.key().to_string(),
                message: e.to_string(),
            })?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == prefix.len() {
            break;
        }
    }
    prefix.truncate(filled);

    let orientation = exif::orientation_from_jpeg(&prefix)
        .and_then(ExifOrientation::from_exif_value)
        .unwrap_or(ExifOrientation::NORMAL);
    Ok(orientation)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesImageSource;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{GrayImage, ImageEncoder, Luma};

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]));
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, 80);
        encoder.encode_image(&img).unwrap();
        buf
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, _| Luma([(x % 256) as u8]));
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::L8)
            .unwrap();
        buf
    }

    #[test]
    fn test_probe_jpeg() {
        let source = BytesImageSource::new("mem://a.jpg", jpeg_bytes(320, 200));
        let info = decode_image_info(&source, false).unwrap();
        assert_eq!(info.size, IntSize::new(320, 200));
        assert_eq!(info.mime_type, "image/jpeg");
        assert_eq!(info.orientation, ExifOrientation::NORMAL);
        assert_eq!(info.applied_size(), IntSize::new(320, 200));
    }

    #[test]
    fn test_probe_png() {
        let source = BytesImageSource::new("mem://a.png", png_bytes(64, 48));
        let info = decode_image_info(&source, false).unwrap();
        assert_eq!(info.size, IntSize::new(64, 48));
        assert_eq!(info.mime_type, "image/png");
    }

    #[test]
    fn test_probe_garbage_fails() {
        let source = BytesImageSource::new("mem://junk", vec![0u8; 64]);
        let result = decode_image_info(&source, false);
        assert!(matches!(
            result,
            Err(ProbeError::UnrecognizedFormat { .. }) | Err(ProbeError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_probe_oriented_jpeg() {
        // Splice an EXIF APP1 segment with orientation 6 right after SOI.
        let mut data = jpeg_bytes(100, 60);
        let app1 = exif::tests::exif_app1_segment(6, true);
        let mut spliced = data[..2].to_vec();
        spliced.extend_from_slice(&app1);
        spliced.extend_from_slice(&data.split_off(2));

        let source = BytesImageSource::new("mem://rot.jpg", spliced);
        let info = decode_image_info(&source, false).unwrap();
        assert_eq!(info.orientation, ExifOrientation::from_exif_value(6).unwrap());
        // Stored 100x60, displayed 60x100
        assert_eq!(info.size, IntSize::new(100, 60));
        assert_eq!(info.applied_size(), IntSize::new(60, 100));

        // ignore_exif_orientation forces normal
        let source = BytesImageSource::new("mem://rot.jpg", source_bytes(&source));
        let info = decode_image_info(&source, true).unwrap();
        assert_eq!(info.orientation, ExifOrientation::NORMAL);
    }

    fn source_bytes(source: &BytesImageSource) -> Vec<u8> {
        use std::io::Read;
        let mut buf = Vec::new();
        source.open().unwrap().read_to_end(&mut buf).unwrap();
        buf
    }
}
