//! # Error Types
//!
//! Comprehensive error handling for the session layer.
//!
//! This module defines all error variants that can occur during protocol operations,
//! from low-level I/O errors to high-level protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Transport failures and closed connections
//! - **Codec Errors**: Malformed varints, oversized strings and collections
//! - **Frame Errors**: Length-prefix violations and decompression failures
//! - **Session Errors**: Dispatch mismatches, timeouts, rate-limit violations
//!
//! ## Fault escalation
//! Most decode errors are connection-fatal and escalate through the connection's
//! fault path. A packet type may mark its body faults droppable by wrapping them
//! in [`ProtocolError::Skippable`]; the connection logs those and drops the single
//! packet instead of closing.

use crate::protocol::{Direction, ProtocolPhase};
use std::io;
use thiserror::Error;

/// Primary error type for all session-layer operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Varint wider than the 5-byte / 10-byte cap")]
    MalformedVarInt,

    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("Buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("String is not valid UTF-8")]
    InvalidUtf8,

    #[error("String too long: {len} > {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("Collection too long: declared {len} > {max}")]
    CollectionTooLong { len: usize, max: usize },

    #[error("Invalid enum ordinal: {0}")]
    InvalidEnumOrdinal(i32),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Packet body not fully consumed: {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Packet too big: {len} > {max}")]
    PacketTooBig { len: usize, max: usize },

    #[error("Decompressed size mismatch: declared {declared}, got {actual}")]
    DecompressionSizeMismatch { declared: usize, actual: usize },

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Invalid packet id {id} for {phase}/{direction}")]
    InvalidPacketId {
        phase: ProtocolPhase,
        direction: Direction,
        id: i32,
    },

    #[error("Listener has no handler capability for {phase}/{direction}")]
    ListenerMismatch {
        phase: ProtocolPhase,
        direction: Direction,
    },

    #[error("Encryption is already enabled on this connection")]
    EncryptionAlreadyEnabled,

    #[error("Timed out")]
    Timeout,

    #[error("Packet rate exceeded: {average:.1} packets/interval over limit {limit:.1}")]
    RateExceeded { average: f32, limit: f32 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Skippable decode fault: {0}")]
    Skippable(#[source] Box<ProtocolError>),
}

impl ProtocolError {
    /// Wrap a decode fault so the connection drops the packet instead of closing.
    pub fn skippable(err: ProtocolError) -> Self {
        ProtocolError::Skippable(Box::new(err))
    }

    /// Whether this fault may be dropped without escalating.
    pub fn is_skippable(&self) -> bool {
        matches!(self, ProtocolError::Skippable(_))
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
