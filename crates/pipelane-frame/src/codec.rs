use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: type (4) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size accepted by the streaming codec: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest payload the 32-bit length field can describe.
pub const MAX_ENCODABLE_PAYLOAD: usize = i32::MAX as usize;

/// A type-tagged message.
///
/// `msg_type` is opaque to the protocol; any 32-bit value is legal and its
/// meaning is agreed between the two applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Application-defined message type.
    pub msg_type: i32,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(msg_type: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut dst)?;
        Ok(dst.freeze())
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────────────────┐
/// │ Type (4B LE) │ Length       │ Payload         │
/// │ i32          │ (4B LE, i32) │ (Length bytes)  │
/// └──────────────┴──────────────┴─────────────────┘
/// ```
///
/// Fails only if the payload cannot be described by the length field.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let len = frame.payload.len();
    if len > MAX_ENCODABLE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_ENCODABLE_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + len);
    dst.put_i32_le(frame.msg_type);
    dst.put_i32_le(len as i32);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode one frame from the start of `src`.
///
/// When the caller knows exactly how many payload bytes are present
/// (`known_payload_len`), that count is used instead of the length field.
/// Either way the payload is never read past the end of `src`.
pub fn decode_frame(src: &[u8], known_payload_len: Option<usize>) -> Result<Frame> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::FrameTooShort {
            len: src.len(),
            min: HEADER_SIZE,
        });
    }

    let mut header = &src[..HEADER_SIZE];
    let msg_type = header.get_i32_le();
    let declared = header.get_i32_le();

    let payload_len = match known_payload_len {
        Some(len) => len,
        None => usize::try_from(declared).map_err(|_| FrameError::InvalidLength(declared))?,
    };

    let available = src.len() - HEADER_SIZE;
    if payload_len > available {
        return Err(FrameError::Truncated {
            expected: payload_len,
            available,
        });
    }

    let payload = Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + payload_len]);
    Ok(Frame { msg_type, payload })
}
