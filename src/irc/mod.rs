//! IRC client side: line parsing, framing, and the connection engine.

pub mod codec;
pub mod connection;
pub mod message;

pub use connection::{Connection, ConnectionError, EventStream, Identity, Sender, Session};
pub use message::{Event, Hostmask, ParseError};
