/// Line framing shared by the chat and push-stream read paths.
///
/// Splits a byte stream on `\n`. A `\r` directly before the newline is
/// dropped, so `\n` and `\r\n` terminated peers frame identically.
/// Outgoing lines are terminated with a bare `\n`.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest line accepted before the terminator.
/// RFC 2812 says 512 bytes; IRCv3 `message-tags` can push this to 8191.
pub const MAX_LINE_LENGTH: usize = 8191;

/// Framing error: an oversized line or an I/O failure underneath.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("line exceeds maximum length ({max} bytes)")]
    LineTooLong { max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Newline-delimited record framer.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let mut line = src.split_to(pos);
                src.advance(1); // skip \n

                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                if line.len() > self.max_length {
                    return Err(FrameError::LineTooLong {
                        max: self.max_length,
                    });
                }
                Ok(Some(line))
            }
            None => {
                // No complete line yet. Refuse to buffer without bound.
                if src.len() > self.max_length + 1 {
                    return Err(FrameError::LineTooLong {
                        max: self.max_length,
                    });
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
