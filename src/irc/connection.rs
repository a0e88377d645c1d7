/// IRC client connection: registration, keepalive, and ordered writes.
///
/// A connection opens a TCP socket, sends `NICK`/`USER` straight away, then
/// runs a read loop that parses every line into an [`Event`]. A few events
/// are answered internally and never reach the [`EventStream`]:
///
/// - `001` (welcome) moves the session from Registering to Active, which is
///   the only point where the write worker is spawned. Lines queued through
///   [`Sender`] before then stay in the queue.
/// - `PING` is answered on the read path, ahead of anything queued. Some
///   ircds expect a PONG before they will send `001` at all.
/// - A NickServ notice saying the nick is registered triggers `IDENTIFY`
///   through the normal queue when a password is configured.
///
/// There is no reconnect at this layer. Any read, parse, or write failure
/// ends the session and is returned from [`Session::run`].
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::codec::{CodecError, IrcCodec};
use super::message::Event;
use crate::codec::{FrameError, LineCodec};

/// Outbound queue capacity. Producers wait once it is full.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// Nick of the identity service whose notices trigger `IDENTIFY`.
const IDENTIFY_SERVICE: &str = "NickServ";

/// Notice text NickServ sends when the nick needs identifying.
const REGISTERED_PHRASE: &str = "This nickname is registered";

/// Stream of inbound events that no auto-responder handled.
pub type EventStream = UnboundedReceiverStream<Event>;

type LineWriter = FramedWrite<OwnedWriteHalf, LineCodec>;
type SharedWriter = Arc<Mutex<LineWriter>>;

/// Who we register as.
#[derive(Debug, Clone)]
pub struct Identity {
    pub nick: String,
    pub user: String,
    pub realname: String,
    /// NickServ password. `None` disables auto-identify.
    pub password: Option<String>,
}

/// Errors that end a chat session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to send registration: {0}")]
    Register(#[source] FrameError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("write failed: {0}")]
    Write(#[source] FrameError),
    #[error("write worker aborted: {0}")]
    WorkerAborted(String),
    #[error("connection closed")]
    Closed,
}

/// Cloneable handle that queues outbound lines.
///
/// Sends resolve once the line is queued, not once it is written.
#[derive(Debug, Clone)]
pub struct Sender {
    queue: mpsc::Sender<String>,
}

impl Sender {
    /// Queue a raw line (no terminator).
    pub async fn send_line(&self, line: impl Into<String>) -> Result<(), ConnectionError> {
        let line = line.into();
        debug!(%line, "irc: queueing");
        self.queue
            .send(line)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    pub async fn join_channel(&self, channel: &str) -> Result<(), ConnectionError> {
        self.send_line(format!("JOIN {channel}")).await
    }

    pub async fn send_message(&self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.send_line(format!("PRIVMSG {target} :{text}")).await
    }
}

/// An IRC connection that has not dialed yet.
#[derive(Debug)]
pub struct Connection {
    addr: String,
    identity: Identity,
    queue_tx: mpsc::Sender<String>,
    queue_rx: mpsc::Receiver<String>,
    event_tx: mpsc::UnboundedSender<Event>,
}

impl Connection {
    /// Build a connection plus its send handle and event stream.
    ///
    /// The handle is usable immediately; anything queued is held until the
    /// server accepts registration.
    pub fn new(addr: impl Into<String>, identity: Identity) -> (Self, Sender, EventStream) {
        let (queue_tx, queue_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sender = Sender {
            queue: queue_tx.clone(),
        };
        let conn = Self {
            addr: addr.into(),
            identity,
            queue_tx,
            queue_rx,
            event_tx,
        };
        (conn, sender, UnboundedReceiverStream::new(event_rx))
    }

    /// Dial the server and send the registration lines.
    pub async fn connect(self) -> Result<Session, ConnectionError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        info!(server = %self.addr, "irc: connected");

        let (read_half, write_half) = stream.into_split();
        let mut writer = FramedWrite::new(write_half, LineCodec::new());

        let Identity {
            nick,
            user,
            realname,
            ..
        } = &self.identity;
        writer
            .feed(format!("NICK {nick}"))
            .await
            .map_err(ConnectionError::Register)?;
        writer
            .feed(format!("USER {user} - - :{realname}"))
            .await
            .map_err(ConnectionError::Register)?;
        writer.flush().await.map_err(ConnectionError::Register)?;
        info!(server = %self.addr, nick = %nick, "irc: registration sent, waiting for 001");

        Ok(Session {
            reader: FramedRead::new(read_half, IrcCodec::new()),
            phase: Phase::Registering(self.queue_rx),
            responder: Responder {
                addr: self.addr,
                identity: self.identity,
                writer: Arc::new(Mutex::new(writer)),
                queue: self.queue_tx,
                events: self.event_tx,
            },
        })
    }

    /// Connect, then run the session until it fails.
    pub async fn run(self) -> Result<(), ConnectionError> {
        self.connect().await?.run().await
    }
}

/// A registered-or-registering connection with a running read loop.
pub struct Session {
    reader: FramedRead<OwnedReadHalf, IrcCodec>,
    phase: Phase,
    responder: Responder,
}

impl Session {
    /// Read and dispatch until the connection fails.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let Session {
            mut reader,
            mut phase,
            mut responder,
        } = self;

        loop {
            let frame = match &mut phase {
                Phase::Registering(_) => reader.next().await,
                Phase::Active(worker) => tokio::select! {
                    frame = reader.next() => frame,
                    exit = worker.join() => {
                        warn!(server = %responder.addr, "irc: write worker stopped");
                        return exit;
                    }
                },
            };

            let mut event = match frame {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!(server = %responder.addr, "irc: read failed: {e}");
                    return Err(e.into());
                }
                None => {
                    info!(server = %responder.addr, "irc: server closed connection");
                    return Err(ConnectionError::Closed);
                }
            };

            if responder.handle(&mut event).await? == Outcome::Registered {
                phase = phase.activate(&responder.writer);
            }
            responder.deliver(event);
        }
    }
}

/// Session lifecycle after the socket is up.
enum Phase {
    /// Waiting for `001`. The queue is parked here untouched.
    Registering(mpsc::Receiver<String>),
    /// Write worker owns the queue.
    Active(WriteWorker),
}

impl Phase {
    /// Registering → Active. Consumes the queue, so the worker can only be
    /// spawned once per session.
    fn activate(self, writer: &SharedWriter) -> Phase {
        match self {
            Phase::Registering(queue) => {
                Phase::Active(WriteWorker::spawn(queue, Arc::clone(writer)))
            }
            active @ Phase::Active(_) => active,
        }
    }
}

/// Handle to the write worker task. Aborts the task when dropped.
struct WriteWorker(JoinHandle<Result<(), ConnectionError>>);

impl WriteWorker {
    fn spawn(queue: mpsc::Receiver<String>, writer: SharedWriter) -> Self {
        Self(tokio::spawn(write_loop(queue, writer)))
    }

    async fn join(&mut self) -> Result<(), ConnectionError> {
        match (&mut self.0).await {
            Ok(result) => result,
            Err(e) => Err(ConnectionError::WorkerAborted(e.to_string())),
        }
    }
}

impl Drop for WriteWorker {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drain the queue one line at a time, flushing after each.
async fn write_loop(
    mut queue: mpsc::Receiver<String>,
    writer: SharedWriter,
) -> Result<(), ConnectionError> {
    while let Some(line) = queue.recv().await {
        writer
            .lock()
            .await
            .send(line)
            .await
            .map_err(ConnectionError::Write)?;
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Continue,
    Registered,
}

/// Auto-responders and event delivery for one session.
struct Responder {
    addr: String,
    identity: Identity,
    writer: SharedWriter,
    queue: mpsc::Sender<String>,
    events: mpsc::UnboundedSender<Event>,
}

impl Responder {
    async fn handle(&mut self, event: &mut Event) -> Result<Outcome, ConnectionError> {
        match event.command.as_str() {
            "001" => {
                event.handled = true;
                info!(server = %self.addr, "irc: registered");
                return Ok(Outcome::Registered);
            }
            "PING" => {
                event.handled = true;
                let pong = match event.message.as_deref() {
                    Some(token) if !token.is_empty() => format!("PONG :{token}"),
                    _ => "PONG".to_string(),
                };
                // Straight to the socket, ahead of the queue.
                self.writer
                    .lock()
                    .await
                    .send(pong)
                    .await
                    .map_err(ConnectionError::Write)?;
            }
            "NOTICE" if self.wants_identify(event) => {
                event.handled = true;
                if let Some(password) = &self.identity.password {
                    info!(server = %self.addr, "irc: identifying with {IDENTIFY_SERVICE}");
                    self.queue
                        .send(format!("PRIVMSG {IDENTIFY_SERVICE} :IDENTIFY {password}"))
                        .await
                        .map_err(|_| ConnectionError::Closed)?;
                }
            }
            _ => {}
        }
        Ok(Outcome::Continue)
    }

    fn wants_identify(&self, event: &Event) -> bool {
        event.nick() == Some(IDENTIFY_SERVICE)
            && event.text().starts_with(REGISTERED_PHRASE)
            && self
                .identity
                .password
                .as_deref()
                .is_some_and(|p| !p.is_empty())
    }

    /// Forward unhandled events. A dropped consumer is not an error.
    fn deliver(&self, event: Event) {
        if event.handled {
            return;
        }
        let _ = self.events.send(event);
    }
}
