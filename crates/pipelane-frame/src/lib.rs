//! Type-tagged, length-prefixed message framing for pipelane channels.
//!
//! Every binary message is framed with:
//! - A 4-byte little-endian signed message type
//! - A 4-byte little-endian signed payload length
//!
//! followed by exactly `length` payload bytes. A legacy text mode sends raw
//! UTF-8 with no framing at all. Both are exposed as `tokio_util` codecs and
//! selected through the [`Framing`] trait.

pub mod binary;
pub mod codec;
pub mod error;
pub mod framing;
pub mod text;

pub use binary::FrameCodec;
pub use codec::{
    decode_frame, encode_frame, Frame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_ENCODABLE_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use framing::{Binary, Framing, Text};
pub use text::TextCodec;
