use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{decode_frame, encode_frame, Frame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Streaming codec for [`Frame`]s.
///
/// Handles partial reads internally: bytes are buffered until a whole frame
/// is available, so callers always get complete frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Reject frames whose length field exceeds `max_payload_size`.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = i32::from_le_bytes([src[4], src[5], src[6], src[7]]);
        let payload_len =
            usize::try_from(declared).map_err(|_| FrameError::InvalidLength(declared))?;

        if payload_len > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload_size,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let wire = src.split_to(total);
        trace!(payload_len, "decoded frame");
        decode_frame(&wire, Some(payload_len)).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}
