/// HTTP/1.1 chunked transfer-encoding framer.
///
/// Skips the status line and headers (everything up to the first blank line),
/// then yields one [`Bytes`] per chunk body. Only the framing is honored;
/// status codes and header values are ignored.
///
/// ```text
/// AwaitingHeaders ──blank line──▶ AwaitingChunkLength ──hex len──▶ AwaitingChunkBody
///                                        ▲                               │
///                                        └──── AwaitingChunkTrailer ◀────┘
/// ```
use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::{FrameError, LineCodec};

/// Refuse chunk lengths above this.
pub const MAX_CHUNK_LEN: usize = 1 << 20;

/// Where the framer is within the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    AwaitingHeaders,
    AwaitingChunkLength,
    AwaitingChunkBody { len: usize },
    AwaitingChunkTrailer,
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("invalid chunk length {0:?}")]
    InvalidLength(String),
    #[error("zero-length chunk (stream terminated)")]
    ZeroLength,
    #[error("chunk of {0} bytes exceeds limit ({MAX_CHUNK_LEN})")]
    TooLarge(usize),
    #[error("expected empty line after chunk, got {0:?}")]
    MalformedTrailer(String),
    #[error("stream ended mid-chunk ({buffered} of {expected} bytes)")]
    Truncated { expected: usize, buffered: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Decoder driving [`ChunkState`] over a raw response byte stream.
#[derive(Debug)]
pub struct ChunkedCodec {
    state: ChunkState,
    lines: LineCodec,
}

impl ChunkedCodec {
    pub fn new() -> Self {
        Self {
            state: ChunkState::AwaitingHeaders,
            lines: LineCodec::new(),
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }
}

impl Default for ChunkedCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a chunk-size line: hex digits, optionally followed by `;ext`.
fn parse_chunk_len(line: &[u8]) -> Result<usize, ChunkError> {
    let text = String::from_utf8_lossy(line);
    let invalid = || ChunkError::InvalidLength(text.to_string());
    let digits = text.split(';').next().unwrap_or_default();
    // from_str_radix alone would let a sign through.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let len = usize::from_str_radix(digits, 16).map_err(|_| invalid())?;
    match len {
        0 => Err(ChunkError::ZeroLength),
        n if n > MAX_CHUNK_LEN => Err(ChunkError::TooLarge(n)),
        n => Ok(n),
    }
}

impl Decoder for ChunkedCodec {
    type Item = Bytes;
    type Error = ChunkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkState::AwaitingHeaders => {
                    let Some(line) = self.lines.decode(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = ChunkState::AwaitingChunkLength;
                    }
                }
                ChunkState::AwaitingChunkLength => {
                    let Some(line) = self.lines.decode(src)? else {
                        return Ok(None);
                    };
                    let len = parse_chunk_len(&line)?;
                    self.state = ChunkState::AwaitingChunkBody { len };
                }
                ChunkState::AwaitingChunkBody { len } => {
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    self.state = ChunkState::AwaitingChunkTrailer;
                    return Ok(Some(src.split_to(len).freeze()));
                }
                ChunkState::AwaitingChunkTrailer => {
                    let Some(line) = self.lines.decode(src)? else {
                        return Ok(None);
                    };
                    if !line.is_empty() {
                        return Err(ChunkError::MalformedTrailer(
                            String::from_utf8_lossy(&line).into_owned(),
                        ));
                    }
                    self.state = ChunkState::AwaitingChunkLength;
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        match self.state {
            ChunkState::AwaitingChunkBody { len } => Err(ChunkError::Truncated {
                expected: len,
                buffered: src.len(),
            }),
            _ if !src.is_empty() => Err(ChunkError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended mid-line",
            ))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::record::RecordDecoder;
    use pretty_assertions::assert_eq;

    const HEADERS: &str = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";

    fn buf(s: &str) -> BytesMut {
        BytesMut::from(s)
    }

    // ── Header section ───────────────────────────────────────────

    #[test]
    fn headers_are_skipped() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf("HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n");
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(codec.state(), ChunkState::AwaitingHeaders);

        src.extend_from_slice(b"\r\n");
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(codec.state(), ChunkState::AwaitingChunkLength);
    }

    // ── Chunks ───────────────────────────────────────────────────

    #[test]
    fn decode_one_chunk() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}8\r\ndata: \n\n\r\n"));
        let chunk = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&chunk[..], b"data: \n\n");
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(codec.state(), ChunkState::AwaitingChunkLength);
    }

    #[test]
    fn decode_consecutive_chunks() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}6\r\ndata: \r\n2\r\n\n\n\r\n"));
        assert_eq!(&codec.decode(&mut src).unwrap().unwrap()[..], b"data: ");
        assert_eq!(&codec.decode(&mut src).unwrap().unwrap()[..], b"\n\n");
        // The trailer is consumed on the next call.
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(src.is_empty());
    }

    #[test]
    fn body_waits_for_all_bytes() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}a\r\n01234"));
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(codec.state(), ChunkState::AwaitingChunkBody { len: 10 });

        src.extend_from_slice(b"56789\r\n");
        assert_eq!(&codec.decode(&mut src).unwrap().unwrap()[..], b"0123456789");
    }

    #[test]
    fn chunk_extension_is_ignored() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}3;name=value\r\nabc\r\n"));
        assert_eq!(&codec.decode(&mut src).unwrap().unwrap()[..], b"abc");
    }

    // ── Framing errors ───────────────────────────────────────────

    #[test]
    fn zero_length_fails() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}0\r\n\r\n"));
        assert!(matches!(codec.decode(&mut src), Err(ChunkError::ZeroLength)));
    }

    #[test]
    fn non_hex_length_fails() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}zz\r\n"));
        assert!(matches!(
            codec.decode(&mut src),
            Err(ChunkError::InvalidLength(ref l)) if l == "zz"
        ));
    }

    #[test]
    fn signed_or_padded_length_fails() {
        for line in ["+6", " 6", "6 ", "6 ;ext", "-1"] {
            let mut codec = ChunkedCodec::new();
            let mut src = buf(&format!("{HEADERS}{line}\r\ndata: \r\n"));
            assert!(
                matches!(codec.decode(&mut src), Err(ChunkError::InvalidLength(ref l)) if l == line),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn empty_length_line_fails() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}\r\n"));
        assert!(matches!(
            codec.decode(&mut src),
            Err(ChunkError::InvalidLength(_))
        ));
    }

    #[test]
    fn oversized_length_fails() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}{:x}\r\n", MAX_CHUNK_LEN + 1));
        assert!(matches!(codec.decode(&mut src), Err(ChunkError::TooLarge(_))));
    }

    #[test]
    fn trailer_must_be_blank() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}3\r\nabcXYZ\r\n"));
        assert_eq!(&codec.decode(&mut src).unwrap().unwrap()[..], b"abc");
        assert!(matches!(
            codec.decode(&mut src),
            Err(ChunkError::MalformedTrailer(ref l)) if l == "XYZ"
        ));
    }

    #[test]
    fn eof_mid_body_is_truncation() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}a\r\n0123"));
        assert!(matches!(
            codec.decode_eof(&mut src),
            Err(ChunkError::Truncated {
                expected: 10,
                buffered: 4
            })
        ));
    }

    // ── Records over chunks ──────────────────────────────────────

    #[test]
    fn lone_carriage_return_chunk_leaves_record_open() {
        let mut codec = ChunkedCodec::new();
        let mut records = RecordDecoder::new();
        let mut payloads = Vec::new();

        // The second chunk body is a single `\r`, which ends no line.
        let mut src = buf(&format!("{HEADERS}6\r\ndata: \r\n1\r\n\r\n"));
        while let Some(chunk) = codec.decode(&mut src).unwrap() {
            payloads.extend(records.feed(&chunk).unwrap());
        }
        assert_eq!(payloads, Vec::<Bytes>::new());
        assert!(!records.is_idle());

        // The newline and the closing blank line finish an empty record.
        src.extend_from_slice(b"2\r\n\n\n\r\n");
        while let Some(chunk) = codec.decode(&mut src).unwrap() {
            payloads.extend(records.feed(&chunk).unwrap());
        }
        assert_eq!(payloads, vec![Bytes::new()]);
        assert!(records.is_idle());
    }

    #[test]
    fn clean_eof_between_chunks() {
        let mut codec = ChunkedCodec::new();
        let mut src = buf(&format!("{HEADERS}1\r\nx\r\n"));
        assert!(codec.decode(&mut src).unwrap().is_some());
        assert!(codec.decode_eof(&mut src).unwrap().is_none());
    }
}
