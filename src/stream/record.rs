/// Push-stream record extraction.
///
/// Chunk bodies carry `data: <text>` lines. A blank line closes the current
/// record. Records and chunks are independent: a record may span several
/// chunks and one chunk may close several records, so the decoder keeps any
/// unterminated line and the open payload between calls.
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::{FrameError, LineCodec};

/// Prefix every non-blank line must carry.
pub const DATA_MARKER: &[u8] = b"data: ";

/// Longest single `data:` line accepted.
const MAX_RECORD_LINE: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("line without `data: ` prefix: {0:?}")]
    MissingDataPrefix(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Stateful `data:` line accumulator.
#[derive(Debug)]
pub struct RecordDecoder {
    lines: LineCodec,
    pending: BytesMut,
    payload: BytesMut,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self {
            lines: LineCodec::with_max_length(MAX_RECORD_LINE),
            pending: BytesMut::new(),
            payload: BytesMut::new(),
        }
    }

    /// Feed one chunk body; returns every record it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, RecordError> {
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(line) = self.lines.decode(&mut self.pending)? {
            if line.is_empty() {
                records.push(self.payload.split().freeze());
                continue;
            }
            match line.strip_prefix(DATA_MARKER) {
                Some(data) => self.payload.extend_from_slice(data),
                None => {
                    return Err(RecordError::MissingDataPrefix(
                        String::from_utf8_lossy(&line).into_owned(),
                    ))
                }
            }
        }
        Ok(records)
    }

    /// True when no partial line or open payload is buffered.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.payload.is_empty()
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}
