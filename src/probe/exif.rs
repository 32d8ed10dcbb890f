//! Minimal EXIF orientation extraction from a JPEG stream prefix.
//!
//! The orientation tag lives in the APP1 segment: a `Exif\0\0` header
//! followed by an embedded TIFF structure whose IFD0 may carry tag 0x0112.
//! Only that one tag is needed, so this is a bounded scan, not a general
//! EXIF parser: walk the JPEG marker segments to APP1, validate the TIFF
//! header, then walk IFD0's entries.
//!
//! # JPEG segment layout
//!
//! ```text
//! FFD8 (SOI) | FFEn <len> <payload> ... | FFDA (SOS) <entropy-coded data>
//! ```
//!
//! Marker segment lengths include the two length bytes themselves. The
//! scan stops at SOS since no metadata segments may follow it.

/// JPEG start-of-image marker bytes.
const SOI: [u8; 2] = [0xFF, 0xD8];

/// APP1 marker byte (second byte after 0xFF).
const MARKER_APP1: u8 = 0xE1;

/// Start-of-scan marker byte; terminates the metadata section.
const MARKER_SOS: u8 = 0xDA;

/// EXIF identifier at the start of an APP1 payload.
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// TIFF magic number (42) directly after the byte-order mark.
const TIFF_MAGIC: u16 = 42;

/// The EXIF orientation tag in IFD0.
const TAG_ORIENTATION: u16 = 0x0112;

/// Byte order of the embedded TIFF structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u16(self, bytes: &[u8], offset: usize) -> Option<u16> {
        let b = bytes.get(offset..offset + 2)?;
        Some(match self {
            Endian::Little => u16::from_le_bytes([b[0], b[1]]),
            Endian::Big => u16::from_be_bytes([b[0], b[1]]),
        })
    }

    fn read_u32(self, bytes: &[u8], offset: usize) -> Option<u32> {
        let b = bytes.get(offset..offset + 4)?;
        Some(match self {
            Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Endian::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }
}

/// Extract the raw EXIF orientation value (1-8) from a JPEG prefix.
///
/// Returns `None` for non-JPEG data, JPEGs without an EXIF segment, and
/// any structurally damaged segment: orientation is advisory, so every
/// failure degrades to "no orientation".
pub(crate) fn orientation_from_jpeg(data: &[u8]) -> Option<u32> {
    if data.len() < 4 || data[0..2] != SOI {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];

        // Padding bytes and standalone markers carry no length field
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == MARKER_SOS {
            return None;
        }
        if (0xD0..=0xD9).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }

        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            return None;
        }

        if marker == MARKER_APP1 {
            let payload = data.get(pos + 4..pos + 2 + seg_len)?;
            if payload.starts_with(EXIF_HEADER) {
                return orientation_from_tiff(&payload[EXIF_HEADER.len()..]);
            }
        }

        pos += 2 + seg_len;
    }
    None
}

/// Walk the embedded TIFF structure's IFD0 for the orientation tag.
fn orientation_from_tiff(tiff: &[u8]) -> Option<u32> {
    let endian = match tiff.get(0..2)? {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        _ => return None,
    };

    if endian.read_u16(tiff, 2)? != TIFF_MAGIC {
        return None;
    }

    let ifd_offset = endian.read_u32(tiff, 4)? as usize;
    let entry_count = endian.read_u16(tiff, ifd_offset)? as usize;
    let entries_start = ifd_offset.checked_add(2)?;

    // Each IFD entry is 12 bytes: tag(2) type(2) count(4) value/offset(4)
    for i in 0..entry_count {
        let entry = entries_start + i * 12;
        let tag = endian.read_u16(tiff, entry)?;
        if tag == TAG_ORIENTATION {
            let value = endian.read_u16(tiff, entry + 8)? as u32;
            return if (1..=8).contains(&value) {
                Some(value)
            } else {
                None
            };
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
