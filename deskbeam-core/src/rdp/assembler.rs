//! Viewer-side frame reconstruction.
//!
//! Applies incoming [`Frame`]s to a persistent screen buffer: full frames
//! replace it, delta frames patch their regions in place. A delta whose
//! `reference_frame_id` does not match the frame currently held is
//! rejected so a lost frame never corrupts the image silently.

use crate::error::DeskbeamError;
use crate::rdp::types::{BYTES_PER_PIXEL, Frame, FrameEncoding};

// ── FrameAssembler ───────────────────────────────────────────────

/// Persistent screen image updated frame by frame.
pub struct FrameAssembler {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    encoding: FrameEncoding,
    /// Id of the frame the buffer currently represents.
    current_id: Option<u64>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            width: 0,
            height: 0,
            encoding: FrameEncoding::RawBgra,
            current_id: None,
        }
    }

    /// Apply a received frame and return the up-to-date buffer.
    ///
    /// Pre-compressed frames are stored as-is; only raw frames can be
    /// patched by later deltas.
    pub fn apply(&mut self, frame: &Frame) -> Result<&[u8], DeskbeamError> {
        if frame.is_delta {
            self.apply_delta(frame)?;
        } else {
            self.apply_full(frame)?;
        }
        self.current_id = Some(frame.frame_id);
        Ok(&self.buffer)
    }

    /// Current buffer contents (empty before the first full frame).
    pub fn frame_buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn encoding(&self) -> FrameEncoding {
        self.encoding
    }

    pub fn current_frame_id(&self) -> Option<u64> {
        self.current_id
    }

    /// Drop the held image; the next frame must be a full frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // ── Internal ─────────────────────────────────────────────────

    fn apply_full(&mut self, frame: &Frame) -> Result<(), DeskbeamError> {
        if frame.encoding.is_raw() && frame.data.len() != frame.raw_len() {
            return Err(DeskbeamError::Encoding(format!(
                "full frame {} has {} bytes, expected {}",
                frame.frame_id,
                frame.data.len(),
                frame.raw_len()
            )));
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(&frame.data);
        self.width = frame.width;
        self.height = frame.height;
        self.encoding = frame.encoding;
        Ok(())
    }

    fn apply_delta(&mut self, frame: &Frame) -> Result<(), DeskbeamError> {
        if self.current_id.is_none() || frame.reference_frame_id != self.current_id {
            return Err(DeskbeamError::Encoding(format!(
                "delta {} references {:?}, holding {:?}",
                frame.frame_id, frame.reference_frame_id, self.current_id
            )));
        }
        if !self.encoding.is_raw() || frame.width != self.width || frame.height != self.height {
            return Err(DeskbeamError::Encoding(format!(
                "delta {} does not match the held {}x{} {} image",
                frame.frame_id, self.width, self.height, self.encoding
            )));
        }
        if !frame.is_well_formed() {
            return Err(DeskbeamError::Encoding(format!(
                "delta {} region layout is inconsistent",
                frame.frame_id
            )));
        }

        let stride = self.width as usize * BYTES_PER_PIXEL;
        for region in &frame.regions {
            if !region.fits_within(self.width, self.height) {
                return Err(DeskbeamError::Encoding(format!(
                    "region at ({}, {}) exceeds the screen",
                    region.x, region.y
                )));
            }

            let row_len = region.width as usize * BYTES_PER_PIXEL;
            let src = &frame.data[region.byte_offset..region.byte_offset + region.byte_length];
            for (row, chunk) in src.chunks_exact(row_len).enumerate() {
                let dst = (region.y as usize + row) * stride + region.x as usize * BYTES_PER_PIXEL;
                self.buffer[dst..dst + row_len].copy_from_slice(chunk);
            }
        }
        Ok(())
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
