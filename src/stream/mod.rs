//! Server-push stream over HTTP/1.1 chunked transfer encoding.
//!
//! - **chunked**: transfer-encoding framer (headers, hex lengths, trailers)
//! - **record**: `data:` line accumulator producing one payload per record
//! - **supervisor**: connection attempts, stall timeout, restart loop

pub mod chunked;
pub mod record;
pub mod supervisor;

pub use chunked::{ChunkError, ChunkState, ChunkedCodec};
pub use record::{RecordDecoder, RecordError};
pub use supervisor::{
    Endpoint, PayloadStream, StreamConfig, StreamError, Supervisor, SupervisorHandle,
};
