use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Legacy unframed mode: raw UTF-8 text, no message boundaries.
///
/// Each decode yields whatever text has arrived so far. An incomplete
/// multi-byte sequence at the end of the buffer is held back until the
/// rest arrives; invalid sequences are replaced with U+FFFD.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TextCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let ready = match std::str::from_utf8(src) {
            Ok(_) => src.len(),
            // Incomplete trailing sequence: keep it for the next read.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => src.len(),
        };

        if ready == 0 {
            return Ok(None);
        }

        let chunk = src.split_to(ready);
        Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(text) = self.decode(src)? {
            return Ok(Some(text));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

impl Encoder<String> for TextCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_everything_buffered() {
        let mut buf = BytesMut::from("hello world");
        let text = TextCodec.decode(&mut buf).unwrap();
        assert_eq!(text.as_deref(), Some("hello world"));
        assert!(buf.is_empty());
        assert!(TextCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn holds_back_split_code_point() {
        let snowman = "☃".as_bytes();
        let mut buf = BytesMut::from(&b"ab"[..]);
        buf.extend_from_slice(&snowman[..1]);

        let first = TextCodec.decode(&mut buf).unwrap();
        assert_eq!(first.as_deref(), Some("ab"));
        assert_eq!(buf.len(), 1);
        assert!(TextCodec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&snowman[1..]);
        let second = TextCodec.decode(&mut buf).unwrap();
        assert_eq!(second.as_deref(), Some("☃"));
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut buf = BytesMut::from(&[b'o', 0xFF, b'k'][..]);
        let text = TextCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(text, "o\u{FFFD}k");
    }

    #[test]
    fn eof_flushes_dangling_bytes() {
        let mut buf = BytesMut::from(&"é".as_bytes()[..1]);
        let text = TextCodec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(text, "\u{FFFD}");
        assert!(TextCodec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encodes_raw_utf8() {
        let mut dst = BytesMut::new();
        TextCodec.encode("héllo".to_string(), &mut dst).unwrap();
        assert_eq!(dst.as_ref(), "héllo".as_bytes());
    }
}
