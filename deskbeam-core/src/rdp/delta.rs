//! Block-level delta encoding between consecutive frames.
//!
//! Divides the screen into `block_size × block_size` tiles and compares
//! each tile byte-for-byte against the reference frame. When few enough
//! tiles changed, only their pixels are sent; otherwise the whole frame
//! goes out and becomes the new reference.
//!
//! ## Threshold tie-break
//!
//! The full-frame fallback triggers only when the changed area is
//! **strictly greater** than the threshold. A change percentage exactly
//! equal to the threshold is still sent as a delta.

use std::cmp;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::rdp::types::{BYTES_PER_PIXEL, ChangedRegion, Frame};

/// Default tile edge in pixels.
pub const DEFAULT_BLOCK_SIZE: usize = 32;

/// Default changed-area percentage above which a full frame is sent.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 5.0;

// ── Block ────────────────────────────────────────────────────────

/// A tile that differs from the reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

// ── DeltaEncoder ─────────────────────────────────────────────────

/// Stateful encoder holding one reference frame.
///
/// The reference sits behind an internal lock so the encoder can be
/// shared, but encoding is inherently sequential: callers should feed
/// frames in capture order from a single task.
pub struct DeltaEncoder {
    reference: Mutex<Option<Frame>>,
    block_size: usize,
    threshold_percent: f64,
}

impl DeltaEncoder {
    /// Encoder with 32-pixel tiles and a 5 % threshold.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_BLOCK_SIZE, DEFAULT_THRESHOLD_PERCENT)
    }

    /// Encoder with a custom tile size and threshold.
    ///
    /// The threshold is clamped to `[0, 100]`; a zero block size falls
    /// back to the default.
    pub fn with_config(block_size: usize, threshold_percent: f64) -> Self {
        let block_size = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        let threshold_percent = if threshold_percent.is_nan() {
            DEFAULT_THRESHOLD_PERCENT
        } else {
            threshold_percent.clamp(0.0, 100.0)
        };
        Self {
            reference: Mutex::new(None),
            block_size,
            threshold_percent,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Forget the reference, forcing the next frame to be sent in full.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    /// Id of the current reference frame, if any.
    pub fn reference_id(&self) -> Option<u64> {
        self.lock().as_ref().map(|f| f.frame_id)
    }

    /// Encode `current` against the reference and make it the new reference.
    ///
    /// Returns the frame to transmit; its `is_delta` flag says which form
    /// it took. The first frame, a dimension change, or a pre-compressed
    /// frame always yields the full frame.
    pub fn encode(&self, current: Frame) -> Frame {
        let mut reference = self.lock();

        let changed = match reference.as_ref() {
            Some(prev) if Self::comparable(prev, &current) => {
                Some(self.changed_blocks(prev, &current))
            }
            _ => None,
        };

        let Some(changed) = changed else {
            *reference = Some(current.clone());
            return current;
        };

        let total_area = current.width as f64 * current.height as f64;
        let changed_area: f64 = changed
            .iter()
            .map(|b| b.width as f64 * b.height as f64)
            .sum();
        let changed_percent = changed_area / total_area * 100.0;

        if changed_percent > self.threshold_percent {
            *reference = Some(current.clone());
            return current;
        }

        let reference_id = reference.as_ref().map(|f| f.frame_id);
        let delta = Self::build_delta(&current, &changed, reference_id);
        *reference = Some(current);
        delta
    }

    // ── Internal ─────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.reference.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn comparable(prev: &Frame, current: &Frame) -> bool {
        prev.width == current.width
            && prev.height == current.height
            && current.width > 0
            && current.height > 0
            && prev.is_full_raw()
            && current.is_full_raw()
    }

    fn changed_blocks(&self, previous: &Frame, current: &Frame) -> Vec<Block> {
        let w = current.width as usize;
        let h = current.height as usize;
        let bs = self.block_size;

        let blocks_x = w.div_ceil(bs);
        let blocks_y = h.div_ceil(bs);

        let mut changed = Vec::new();

        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let start_x = bx * bs;
                let start_y = by * bs;
                let end_x = cmp::min(start_x + bs, w);
                let end_y = cmp::min(start_y + bs, h);

                if Self::block_differs(current, previous, start_x, start_y, end_x, end_y) {
                    changed.push(Block {
                        x: start_x,
                        y: start_y,
                        width: end_x - start_x,
                        height: end_y - start_y,
                    });
                }
            }
        }

        changed
    }

    /// Row-by-row byte comparison for a rectangular tile.
    fn block_differs(
        current: &Frame,
        previous: &Frame,
        start_x: usize,
        start_y: usize,
        end_x: usize,
        end_y: usize,
    ) -> bool {
        let stride = current.stride();
        let left = start_x * BYTES_PER_PIXEL;
        let right = end_x * BYTES_PER_PIXEL;

        (start_y..end_y).any(|y| {
            let row = y * stride;
            current.data[row + left..row + right] != previous.data[row + left..row + right]
        })
    }

    /// Concatenate the changed tiles' rows in scan order.
    fn build_delta(current: &Frame, changed: &[Block], reference_id: Option<u64>) -> Frame {
        let stride = current.stride();
        let total_bytes: usize = changed
            .iter()
            .map(|b| b.width * b.height * BYTES_PER_PIXEL)
            .sum();

        let mut data = Vec::with_capacity(total_bytes);
        let mut regions = Vec::with_capacity(changed.len());

        for block in changed {
            let byte_offset = data.len();
            let row_len = block.width * BYTES_PER_PIXEL;
            for y in block.y..block.y + block.height {
                let start = y * stride + block.x * BYTES_PER_PIXEL;
                data.extend_from_slice(&current.data[start..start + row_len]);
            }
            regions.push(ChangedRegion {
                x: block.x as u32,
                y: block.y as u32,
                width: block.width as u32,
                height: block.height as u32,
                byte_offset,
                byte_length: data.len() - byte_offset,
            });
        }

        Frame {
            frame_id: current.frame_id,
            width: current.width,
            height: current.height,
            encoding: current.encoding,
            data,
            quality: current.quality,
            is_delta: true,
            reference_frame_id: reference_id,
            regions,
        }
    }
}

impl Default for DeltaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
