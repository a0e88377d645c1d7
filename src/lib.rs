//! ticker: relays a live market push stream into an IRC channel.
//!
//! # Architecture
//!
//! - **codec**: newline framing shared by both read paths
//! - **irc**: message parser and the client connection engine
//! - **stream**: chunked HTTP push stream and its restart supervisor
//! - **config**: `ticker.json` loading
//! - **ticker**: market message decoding and summary formatting

pub mod codec;
pub mod config;
pub mod irc;
pub mod stream;
pub mod ticker;

pub use config::Config;
