//! # Binary Codec
//!
//! Low-level packet serialization and the byte-stream pipeline stages.
//!
//! ## Components
//! - **PacketBuffer**: cursor-based reader/writer every packet encodes through
//! - **Document**: self-describing structured passthrough with a byte budget
//! - **FrameCodec**: varint-length-prefixed frame splitter/joiner
//! - **CompressionStage**: threshold-gated payload compression
//! - **CipherStage**: continuous stream cipher over raw bytes
//! - **SessionCodec**: the composed inbound/outbound pipeline
//!
//! ## Wire Format
//! ```text
//! [varint payload_len] [payload]                      frame
//! [varint uncompressed_len | 0] [bytes]               compression sub-frame
//! [varint packet_id] [packet body]                    payload, post-decrypt
//! ```
//!
//! ## Security
//! - Length validation before allocation at every layer
//! - Decompression-bomb ceiling (8 MiB)
//! - Bounded strings, collections, and document budgets

pub mod buffer;
pub mod cipher;
pub mod compression;
pub mod document;
pub mod frame;
pub mod session;

pub use buffer::{BlockPos, PacketBuffer, WireEnum};
pub use cipher::CipherStage;
pub use compression::{CompressionKind, CompressionStage};
pub use document::Document;
pub use frame::FrameCodec;
pub use session::SessionCodec;
