//! EXIF orientation as an explicit algebraic transform.
//!
//! The eight EXIF orientation values (tag 0x0112, values 1-8) describe how
//! stored pixels must be remapped to display the image upright. Instead of
//! a general affine matrix, the transform is represented exactly as it is
//! defined: an optional horizontal mirror followed by a clockwise rotation
//! of 0-3 quarter turns. Composition and inversion are defined
//! algebraically on that pair.
//!
//! # Orientation values
//!
//! | Value | Name            | mirror | quarter turns (CW) |
//! |-------|-----------------|--------|--------------------|
//! | 1     | Normal          | no     | 0                  |
//! | 2     | FlipHorizontal  | yes    | 0                  |
//! | 3     | Rotate180       | no     | 2                  |
//! | 4     | FlipVertical    | yes    | 2                  |
//! | 5     | Transpose       | yes    | 3                  |
//! | 6     | Rotate90        | no     | 1                  |
//! | 7     | Transverse      | yes    | 1                  |
//! | 8     | Rotate270       | no     | 3                  |
//!
//! The mirror is applied first, then the rotation. Every mirrored variant
//! is its own inverse; the pure rotations invert by rotating the remaining
//! way around.

use bytes::Bytes;

use super::{IntRect, IntSize};

/// Bytes per pixel for the RGBA8 buffers this engine works with.
const BYTES_PER_PIXEL: usize = 4;

/// An EXIF orientation transform: horizontal mirror, then CW quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExifOrientation {
    mirrored: bool,
    quarter_turns: u8,
}

impl ExifOrientation {
    /// Orientation 1: stored pixels are already upright.
    pub const NORMAL: ExifOrientation = ExifOrientation {
        mirrored: false,
        quarter_turns: 0,
    };

    /// Build from a raw EXIF orientation tag value (1-8).
    ///
    /// Returns `None` for 0 ("undefined") and any out-of-range value;
    /// callers treat that the same as [`ExifOrientation::NORMAL`].
    pub fn from_exif_value(value: u32) -> Option<ExifOrientation> {
        let (mirrored, quarter_turns) = match value {
            1 => (false, 0),
            2 => (true, 0),
            3 => (false, 2),
            4 => (true, 2),
            5 => (true, 3),
            6 => (false, 1),
            7 => (true, 1),
            8 => (false, 3),
            _ => return None,
        };
        Some(ExifOrientation {
            mirrored,
            quarter_turns,
        })
    }

    /// The raw EXIF tag value (1-8) for this transform.
    pub fn exif_value(&self) -> u32 {
        match (self.mirrored, self.quarter_turns) {
            (false, 0) => 1,
            (true, 0) => 2,
            (false, 2) => 3,
            (true, 2) => 4,
            (true, 3) => 5,
            (false, 1) => 6,
            (true, 1) => 7,
            (false, 3) => 8,
            _ => unreachable!("quarter_turns is always 0..=3"),
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.mirrored && self.quarter_turns == 0
    }

    /// Whether applying this transform swaps width and height.
    pub fn swaps_dimensions(&self) -> bool {
        self.quarter_turns % 2 == 1
    }

    /// The inverse transform, in the same mirror-then-rotate form.
    ///
    /// With a mirror the transform is an involution; without one the
    /// inverse rotates the remaining way around.
    pub fn inverse(&self) -> ExifOrientation {
        if self.mirrored {
            *self
        } else {
            ExifOrientation {
                mirrored: false,
                quarter_turns: (4 - self.quarter_turns) % 4,
            }
        }
    }

    /// Compose: apply `self` first, then `other`.
    ///
    /// Derived from the identity `mirror ∘ rotate(k) = rotate(-k) ∘ mirror`.
    pub fn then(&self, other: ExifOrientation) -> ExifOrientation {
        let quarter_turns = if other.mirrored {
            (other.quarter_turns + 4 - self.quarter_turns) % 4
        } else {
            (other.quarter_turns + self.quarter_turns) % 4
        };
        ExifOrientation {
            mirrored: self.mirrored != other.mirrored,
            quarter_turns,
        }
    }

    /// The size of the space after applying this transform.
    pub fn apply_to_size(&self, size: IntSize) -> IntSize {
        if self.swaps_dimensions() {
            size.transposed()
        } else {
            size
        }
    }

    /// Map a rectangle between stored and displayed space.
    ///
    /// `space_size` is the size of the space `rect` currently lives in.
    /// With `reverse == false` the rect moves from stored to displayed
    /// space; with `reverse == true` it moves back. The round trip is
    /// exact for every in-bounds rect.
    pub fn apply_to_rect(&self, rect: IntRect, space_size: IntSize, reverse: bool) -> IntRect {
        if reverse {
            self.inverse().map_rect(rect, space_size)
        } else {
            self.map_rect(rect, space_size)
        }
    }

    /// Mirror-then-rotate a rect within `space_size`.
    fn map_rect(&self, rect: IntRect, space_size: IntSize) -> IntRect {
        let w = space_size.width;
        let h = space_size.height;

        let rect = if self.mirrored {
            IntRect::new(w - rect.right, rect.top, w - rect.left, rect.bottom)
        } else {
            rect
        };

        match self.quarter_turns {
            0 => rect,
            1 => IntRect::new(h - rect.bottom, rect.left, h - rect.top, rect.right),
            2 => IntRect::new(w - rect.right, h - rect.bottom, w - rect.left, h - rect.top),
            3 => IntRect::new(rect.top, w - rect.right, rect.bottom, w - rect.left),
            _ => unreachable!("quarter_turns is always 0..=3"),
        }
    }

    /// Remap an RGBA8 pixel buffer from stored to displayed orientation.
    ///
    /// Returns the input unchanged (no copy) when the transform is the
    /// identity. The caller owns freeing the pre-transform buffer when a
    /// new one is returned.
    pub fn apply_to_pixels(&self, pixels: &Bytes, size: IntSize) -> (Bytes, IntSize) {
        if self.is_identity() {
            return (pixels.clone(), size);
        }

        let w = size.width as usize;
        let h = size.height as usize;
        let out_size = self.apply_to_size(size);
        let out_w = out_size.width as usize;
        let mut out = vec![0u8; w * h * BYTES_PER_PIXEL];

        for y in 0..h {
            for x in 0..w {
                let mx = if self.mirrored { w - 1 - x } else { x };
                let (dx, dy) = match self.quarter_turns {
                    0 => (mx, y),
                    1 => (h - 1 - y, mx),
                    2 => (w - 1 - mx, h - 1 - y),
                    3 => (y, w - 1 - mx),
                    _ => unreachable!(),
                };
                let src = (y * w + x) * BYTES_PER_PIXEL;
                let dst = (dy * out_w + dx) * BYTES_PER_PIXEL;
                out[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&pixels[src..src + BYTES_PER_PIXEL]);
            }
        }

        (Bytes::from(out), out_size)
    }
}

impl Default for ExifOrientation {
    fn default() -> Self {
        Self::NORMAL
    }
}

// =============================================================================
// Tests
// =============================================================================
