//! # Session Protocol
//!
//! Binary session layer for phased client/server protocols over async byte
//! streams.
//!
//! The crate is organized bottom-up:
//! - [`codec`]: varint wire primitives, frame splitting, and the hot-swappable
//!   compression/encryption pipeline behind a single tokio codec
//! - [`protocol`]: phases, directions, the typed packet registry, and the
//!   capability-trait listener interface
//! - [`connection`]: the session state machine driving queueing, ticking,
//!   fault escalation, and rate limiting over one transport
//!
//! ## Wire Format
//! ```text
//! [Length varint(≤3)] [Payload(N)]          plain
//! [Length] [DataLen varint] [Compressed]    with compression (DataLen 0 = raw)
//! ```
//! With encryption enabled the whole stream, length prefixes included, is
//! ChaCha20-encrypted.
//!
//! ## Security
//! - Frame ceiling of 2^21 − 1 bytes, enforced before allocation
//! - Declared decompressed sizes capped at 8 MiB (decompression bombs)
//! - Length-validated strings, collections, and nested documents
//!
//! ## Example
//! ```no_run
//! use session_protocol::connection::Connection;
//! use session_protocol::protocol::{Direction, Packet};
//!
//! # async fn run(stream: tokio::net::TcpStream) -> session_protocol::Result<()> {
//! let mut conn = Connection::new(Direction::Serverbound);
//! conn.attach(stream).await?;
//! loop {
//!     conn.poll_receive().await?;
//!     conn.tick().await;
//! }
//! # }
//! ```

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

pub use config::SessionConfig;
pub use connection::{Connection, ConnectionState, PacketSender, RateLimitingPolicy};
pub use error::{ProtocolError, Result};
pub use protocol::{Direction, Packet, PacketListener, ProtocolPhase};
