use std::fmt::Debug;

use tokio_util::codec::{Decoder, Encoder};

use crate::binary::FrameCodec;
use crate::codec::Frame;
use crate::error::FrameError;
use crate::text::TextCodec;

/// Selects the message variant spoken on a channel.
///
/// Both sides of a channel must agree on the variant; nothing on the wire
/// identifies it.
pub trait Framing: Send + Sync + 'static {
    /// What the application sends and receives.
    type Message: Debug + Clone + Send + 'static;

    /// Stream codec for [`Self::Message`].
    type Codec: Decoder<Item = Self::Message, Error = FrameError>
        + Encoder<Self::Message, Error = FrameError>
        + Default
        + Send
        + Sync
        + Unpin
        + 'static;

    /// Size of the buffer each read off the connection fills.
    const READ_BUFFER_SIZE: usize;

    /// Variant name for diagnostics.
    const NAME: &'static str;

    /// Bytes `message` occupies on the wire.
    fn wire_len(message: &Self::Message) -> usize;
}

/// Type-tagged, length-prefixed [`Frame`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binary;

impl Framing for Binary {
    type Message = Frame;
    type Codec = FrameCodec;

    const READ_BUFFER_SIZE: usize = 512;
    const NAME: &'static str = "binary";

    fn wire_len(message: &Frame) -> usize {
        message.wire_size()
    }
}

/// Unframed UTF-8 text (legacy mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl Framing for Text {
    type Message = String;
    type Codec = TextCodec;

    const READ_BUFFER_SIZE: usize = 256;
    const NAME: &'static str = "text";

    fn wire_len(message: &String) -> usize {
        message.len()
    }
}
