//! Frame types shared by the capture, encoding and display pipeline.
//!
//! A [`Frame`] is both the pipeline representation and the `ScreenData`
//! wire payload. Raw frames are tightly packed BGRA rows
//! (`width * 4` bytes per row, no padding).

use serde::{Deserialize, Serialize};

/// Bytes per pixel for raw BGRA buffers.
pub const BYTES_PER_PIXEL: usize = 4;

// ── FrameEncoding ────────────────────────────────────────────────

/// How a frame's buffer is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameEncoding {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    #[default]
    RawBgra,
    /// Pre-compressed by the capture collaborator; never delta-encoded.
    Jpeg,
    /// Pre-compressed by the capture collaborator; never delta-encoded.
    Png,
}

impl FrameEncoding {
    pub fn is_raw(self) -> bool {
        matches!(self, FrameEncoding::RawBgra)
    }
}

impl std::fmt::Display for FrameEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameEncoding::RawBgra => write!(f, "raw_bgra"),
            FrameEncoding::Jpeg => write!(f, "jpeg"),
            FrameEncoding::Png => write!(f, "png"),
        }
    }
}

// ── ChangedRegion ────────────────────────────────────────────────

/// A rectangle of a delta frame and where its bytes live in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedRegion {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Offset of this region's first byte in the delta buffer.
    pub byte_offset: usize,
    /// `width * height * 4`.
    pub byte_length: usize,
}

impl ChangedRegion {
    /// Pixel area covered by this region.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `width * height * 4`, or `None` when it does not fit a `usize`.
    pub fn pixel_bytes(&self) -> Option<usize> {
        usize::try_from(self.area()).ok()?.checked_mul(BYTES_PER_PIXEL)
    }

    /// Whether the region lies entirely inside a `width` x `height` screen.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        matches!(self.x.checked_add(self.width), Some(right) if right <= width)
            && matches!(self.y.checked_add(self.height), Some(bottom) if bottom <= height)
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One captured screen image, full or delta.
///
/// - `is_delta == false`: `data` holds the full image and `regions` is empty.
/// - `is_delta == true`: `data` holds the regions' bytes concatenated in
///   listed order, and the region lengths sum to `data.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
    pub data: Vec<u8>,
    /// Encoding quality hint (0-100) the capture collaborator used.
    pub quality: u8,
    pub is_delta: bool,
    /// For deltas: the frame the regions apply to.
    pub reference_frame_id: Option<u64>,
    pub regions: Vec<ChangedRegion>,
}

impl Frame {
    /// A full raw BGRA frame.
    pub fn raw(frame_id: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            frame_id,
            width,
            height,
            encoding: FrameEncoding::RawBgra,
            data,
            quality: 100,
            is_delta: false,
            reference_frame_id: None,
            regions: Vec::new(),
        }
    }

    /// Row pitch of a raw frame in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Byte size a full raw image of these dimensions occupies.
    pub fn raw_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// Whether `data` is a full raw image of the declared dimensions.
    pub fn is_full_raw(&self) -> bool {
        self.encoding.is_raw() && !self.is_delta && self.data.len() == self.raw_len()
    }

    /// Check the full/delta buffer layout invariant.
    pub fn is_well_formed(&self) -> bool {
        if !self.is_delta {
            return self.regions.is_empty();
        }
        let mut expected_offset = 0usize;
        for region in &self.regions {
            if region.width == 0 || region.height == 0 || region.byte_offset != expected_offset {
                return false;
            }
            match region.pixel_bytes() {
                Some(len) if len == region.byte_length => {}
                _ => return false,
            }
            expected_offset = match expected_offset.checked_add(region.byte_length) {
                Some(next) => next,
                None => return false,
            };
        }
        expected_offset == self.data.len()
    }

    /// Returns the pixel bytes at `(x, y)` of a full raw frame.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        &self.data[offset..offset + BYTES_PER_PIXEL]
    }
}
