/// Push-stream supervisor: one live HTTP stream, restarted forever.
///
/// Each attempt dials the endpoint, writes a minimal GET by hand, frames the
/// chunked response with [`ChunkedCodec`], and feeds chunk bodies to a fresh
/// [`RecordDecoder`]. Every completed record goes out on the payload stream.
/// The stall timeout bounds each socket read on its own, so a slow but
/// steady peer is never cut off mid-chunk.
///
/// Attempts never overlap: the run loop holds a [`WorkerSlot`] for the whole
/// attempt, and the slot panics if it is ever taken twice. After any failure
/// the slot is released and the next attempt starts after a fixed delay.
/// There is no retry ceiling.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use super::chunked::{ChunkError, ChunkedCodec};
use super::record::{RecordDecoder, RecordError};

/// Delay between a failed attempt and the next one.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Longest wait on a single socket read.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Read buffer headroom reserved before each socket read.
const READ_BUF: usize = 8 * 1024;

const USER_AGENT: &str = "Mozilla/5.0";

/// Stream of assembled records, one `Bytes` per record.
pub type PayloadStream = UnboundedReceiverStream<Bytes>;

/// Where the push stream lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub path: String,
}

fn default_port() -> u16 {
    80
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "bitcoinity.org".into(),
            port: default_port(),
            path: "/ev/markets/markets_bitstamp_USD?_=138".into(),
        }
    }
}

impl Endpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The raw request written at the start of every attempt.
    pub fn request(&self) -> String {
        format!(
            "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\n\r\n",
            path = self.path,
            host = self.host,
        )
    }
}

/// Supervisor timing.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub retry_delay: Duration,
    pub stall_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_delay: RETRY_DELAY,
            stall_timeout: STALL_TIMEOUT,
        }
    }
}

/// Why a single attempt ended.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to send request: {0}")]
    Request(#[source] std::io::Error),
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("no data for {0:?}")]
    Timeout(Duration),
    #[error("server closed the stream")]
    Closed,
}

/// Single-slot guard for the active-worker count.
///
/// The count is 1 while an attempt runs and 0 otherwise. Taking the slot
/// while it is held is a bug in the supervisor, not a network fault, and
/// panics.
#[derive(Debug, Clone, Default)]
pub struct WorkerSlot {
    active: Arc<AtomicUsize>,
}

impl WorkerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> ActiveWorker<'_> {
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        assert_eq!(previous, 0, "stream supervisor: overlapping attempts");
        ActiveWorker { slot: self }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Held for the lifetime of one attempt; releases the slot on drop.
#[derive(Debug)]
pub struct ActiveWorker<'a> {
    slot: &'a WorkerSlot,
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.slot.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Read-only view of a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    slot: WorkerSlot,
    attempts: Arc<AtomicU64>,
}

impl SupervisorHandle {
    /// 0 between attempts, 1 during one.
    pub fn active_workers(&self) -> usize {
        self.slot.active()
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

pub struct Supervisor {
    endpoint: Endpoint,
    config: StreamConfig,
    payloads: mpsc::UnboundedSender<Bytes>,
    slot: WorkerSlot,
    attempts: Arc<AtomicU64>,
}

impl Supervisor {
    pub fn new(endpoint: Endpoint, config: StreamConfig) -> (Self, PayloadStream) {
        let (payloads, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            endpoint,
            config,
            payloads,
            slot: WorkerSlot::new(),
            attempts: Arc::new(AtomicU64::new(0)),
        };
        (supervisor, UnboundedReceiverStream::new(rx))
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            slot: self.slot.clone(),
            attempts: Arc::clone(&self.attempts),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run attempts back to back until the payload stream is dropped.
    pub async fn run(self) {
        let addr = self.endpoint.addr();
        loop {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let result = {
                let _worker = self.slot.acquire();
                debug!(endpoint = %addr, attempt, "stream: attempt starting");
                self.attempt().await
            };

            match result {
                Ok(()) => {
                    info!(endpoint = %addr, "stream: payload consumer gone, stopping");
                    return;
                }
                Err(e) => {
                    warn!(endpoint = %addr, attempt, "stream: attempt failed, will retry: {e}");
                }
            }

            debug_assert_eq!(self.slot.active(), 0);
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    /// One connection lifetime. `Ok` only when nobody is listening any more.
    async fn attempt(&self) -> Result<(), StreamError> {
        let addr = self.endpoint.addr();
        let stall = self.config.stall_timeout;

        let mut stream = tokio::time::timeout(stall, TcpStream::connect(&addr))
            .await
            .map_err(|_| StreamError::Timeout(stall))?
            .map_err(|source| StreamError::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!(endpoint = %addr, "stream: connected");

        stream
            .write_all(self.endpoint.request().as_bytes())
            .await
            .map_err(StreamError::Request)?;
        stream.flush().await.map_err(StreamError::Request)?;

        let mut chunks = ChunkedCodec::new();
        let mut records = RecordDecoder::new();
        let mut buf = BytesMut::with_capacity(READ_BUF);

        loop {
            while let Some(chunk) = chunks.decode(&mut buf)? {
                for payload in records.feed(&chunk)? {
                    if self.payloads.send(payload).is_err() {
                        return Ok(());
                    }
                }
            }

            buf.reserve(READ_BUF);
            let read = tokio::time::timeout(stall, stream.read_buf(&mut buf))
                .await
                .map_err(|_| StreamError::Timeout(stall))?
                .map_err(StreamError::Read)?;
            if read == 0 {
                // Truncated framing reports as a chunk error, a clean end as Closed.
                chunks.decode_eof(&mut buf)?;
                return Err(StreamError::Closed);
            }
        }
    }
}
