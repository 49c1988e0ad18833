//! Length-prefixed envelope codec for `tokio_util::codec::Framed`.
//!
//! ## Wire format
//!
//! ```text
//! length:   i32 LE (4)   byte count of the envelope that follows
//! envelope: [u8]         kind byte + bincode payload (see `message`)
//! ```
//!
//! A declared length outside `(0, MAX_FRAME_SIZE]` is a protocol violation;
//! the decoder returns an error and the reader loop closes the connection
//! without dispatching anything.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DeskbeamError;
use crate::message::Message;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest envelope accepted or produced (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Codec for [`Message`] envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw length prefix.
    fn check_length(declared: i32) -> Result<usize, DeskbeamError> {
        if declared <= 0 || declared as usize > MAX_FRAME_SIZE {
            return Err(DeskbeamError::InvalidFrameLength {
                length: declared as i64,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(declared as usize)
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Message;
    type Error = DeskbeamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let length = Self::check_length(i32::from_le_bytes(prefix))?;

        if src.len() < LENGTH_PREFIX_SIZE + length {
            src.reserve(LENGTH_PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let envelope = src.split_to(length);
        Message::from_bytes(&envelope).map(Some)
    }
}

impl Encoder<Message> for EnvelopeCodec {
    type Error = DeskbeamError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let envelope = item.to_bytes()?;
        if envelope.len() > MAX_FRAME_SIZE {
            return Err(DeskbeamError::InvalidFrameLength {
                length: envelope.len() as i64,
                max: MAX_FRAME_SIZE,
            });
        }
        dst.reserve(LENGTH_PREFIX_SIZE + envelope.len());
        dst.put_i32_le(envelope.len() as i32);
        dst.extend_from_slice(&envelope);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
