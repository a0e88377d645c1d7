/// IRC line codec: frames a TCP byte stream into parsed [`Event`]s.
///
/// Line splitting is delegated to [`LineCodec`]; each complete line is
/// parsed with [`Event::parse`]. Blank lines carry no message and are
/// skipped (RFC 2812 says empty messages are silently ignored).
use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::message::{Event, ParseError};
use crate::codec::{FrameError, LineCodec};

/// Codec error: a framing failure, a protocol parse failure, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio decoder yielding one [`Event`] per inbound line.
#[derive(Debug, Default)]
pub struct IrcCodec {
    lines: LineCodec,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for IrcCodec {
    type Item = Event;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = self.lines.decode(src)? {
            if line.is_empty() {
                continue;
            }
            // Servers are not guaranteed to send UTF-8; keep going on stray bytes.
            let line = String::from_utf8_lossy(&line);
            return Ok(Some(Event::parse(&line)?));
        }
        Ok(None)
    }
}
