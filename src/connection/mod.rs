//! # Connection
//!
//! The session state machine orchestrating the codec pipeline.
//!
//! A connection owns one transport, the current protocol phase, the outbound
//! queue, fault state, and the periodic tick. It has affinity to a single task:
//! every mutation (phase swaps, stage installs, reads, writes) happens on the
//! task that owns the `Connection` value. The one cross-task operation is
//! [`PacketSender`], a cloneable handle that appends to the outbound queue; the
//! owning task drains the queue on attach, on every tick, and before every
//! direct send, so queued packets keep FIFO order and are always written before
//! any newer buffered packet.
//!
//! ## Lifecycle
//! `New → Active` when a transport attaches (phase forced to Handshake);
//! `Active → Closing` when either side closes; `Closing → Closed` after the
//! one-time disconnect notification to the listener.
//!
//! ## Fault escalation
//! Skippable decode faults drop the single packet. The first fatal fault sends
//! one best-effort disconnect packet, then closes, reading paused throughout.
//! A second fault while the first is in flight closes immediately.

use crate::codec::{CipherStage, CompressionKind, CompressionStage, PacketBuffer, SessionCodec};
use crate::config::{SessionConfig, RATE_SAMPLE_TICKS};
use crate::error::{ProtocolError, Result};
use crate::protocol::{Direction, Packet, PacketListener, ProtocolPhase};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

pub mod rate;

pub use rate::RateLimitingPolicy;

/// Callback run when a queued packet has been written to the transport.
pub type SendCallback = Box<dyn FnOnce() + Send>;

struct QueuedPacket {
    packet: Packet,
    on_flush: Option<SendCallback>,
}

type OutboundQueue = Arc<Mutex<VecDeque<QueuedPacket>>>;

/// Cloneable multi-producer handle onto a connection's outbound queue.
///
/// Safe to use from any task, before or after the transport exists; the owning
/// task performs the actual writes.
#[derive(Clone)]
pub struct PacketSender {
    queue: OutboundQueue,
}

impl std::fmt::Debug for PacketSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSender").finish_non_exhaustive()
    }
}

impl PacketSender {
    pub fn send(&self, packet: Packet) {
        self.send_with(packet, None);
    }

    pub fn send_with(&self, packet: Packet, on_flush: Option<SendCallback>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(QueuedPacket { packet, on_flush });
    }
}

/// Coarse connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultState {
    Clear,
    Handling,
}

/// Smoothed per-interval traffic counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrafficStats {
    sent: u32,
    received: u32,
    average_sent: f32,
    average_received: f32,
}

impl TrafficStats {
    /// Fold the interval counters into the smoothed averages and reset them.
    fn sample(&mut self) {
        self.average_sent = lerp(0.75, self.sent as f32, self.average_sent);
        self.average_received = lerp(0.75, self.received as f32, self.average_received);
        self.sent = 0;
        self.received = 0;
    }

    pub fn average_sent(&self) -> f32 {
        self.average_sent
    }

    pub fn average_received(&self) -> f32 {
        self.average_received
    }
}

fn lerp(delta: f32, start: f32, end: f32) -> f32 {
    start + delta * (end - start)
}

/// A protocol session over one transport.
pub struct Connection<T> {
    /// Direction of the packets this side receives.
    receiving: Direction,
    phase: ProtocolPhase,
    transport: Option<Framed<T, SessionCodec>>,
    queue: OutboundQueue,
    listener: Option<Box<dyn PacketListener>>,
    disconnect_reason: Option<String>,
    disconnect_handled: bool,
    transport_closed: bool,
    fault: FaultState,
    reading_paused: bool,
    rate_policy: Option<RateLimitingPolicy>,
    stats: TrafficStats,
    tick_count: u64,
    max_frame_size: usize,
    compression_threshold: i32,
    compression_kind: CompressionKind,
    validate_decompression: bool,
}

impl<T> Connection<T> {
    /// Create an unattached connection that receives `receiving` packets.
    pub fn new(receiving: Direction) -> Self {
        Self::with_config(receiving, &SessionConfig::default())
    }

    pub fn with_config(receiving: Direction, config: &SessionConfig) -> Self {
        Self {
            receiving,
            phase: ProtocolPhase::Handshake,
            transport: None,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            listener: None,
            disconnect_reason: None,
            disconnect_handled: false,
            transport_closed: false,
            fault: FaultState::Clear,
            reading_paused: false,
            rate_policy: config.limits.rate_limit.map(RateLimitingPolicy::new),
            stats: TrafficStats::default(),
            tick_count: 0,
            max_frame_size: config.transport.max_frame_size,
            compression_threshold: config.transport.compression_threshold,
            compression_kind: config.transport.compression_algorithm,
            validate_decompression: config.transport.validate_decompression,
        }
    }

    /// Cross-task handle onto the outbound queue.
    pub fn sender(&self) -> PacketSender {
        PacketSender {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.disconnect_handled {
            ConnectionState::Closed
        } else if self.transport_closed {
            ConnectionState::Closing
        } else if self.transport.is_some() {
            ConnectionState::Active
        } else {
            ConnectionState::New
        }
    }

    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    pub fn receiving(&self) -> Direction {
        self.receiving
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && !self.transport_closed
    }

    pub fn is_encrypted(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|framed| framed.codec().is_encrypted())
    }

    pub fn stats(&self) -> TrafficStats {
        self.stats
    }

    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    /// Swap the registered listener.
    pub fn set_listener(&mut self, listener: Box<dyn PacketListener>) {
        self.listener = Some(listener);
    }

    /// Replace the rate-limiting strategy; `None` disables rate kicking.
    pub fn set_rate_policy(&mut self, policy: Option<RateLimitingPolicy>) {
        self.rate_policy = policy;
    }

    /// Switch the active packet-id table and resume reading.
    pub fn set_protocol(&mut self, phase: ProtocolPhase) {
        debug!(from = %self.phase, to = %phase, "Switching protocol phase");
        self.phase = phase;
        self.reading_paused = false;
    }

    /// Append a packet to the outbound queue without writing it.
    ///
    /// Works before a transport exists; the queue is drained FIFO on attach,
    /// tick, and send.
    pub fn queue_packet(&self, packet: Packet, on_flush: Option<SendCallback>) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(QueuedPacket { packet, on_flush });
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Attach the transport: `New → Active`, phase forced to Handshake, queued
    /// packets flushed in FIFO order.
    pub async fn attach(&mut self, io: T) -> Result<()> {
        if self.transport.is_some() {
            warn!("Transport already attached, replacing");
        }
        self.phase = ProtocolPhase::Handshake;
        let mut codec = SessionCodec::new(self.max_frame_size);
        if self.compression_threshold >= 0 {
            codec.install_compression(CompressionStage::new(
                self.compression_threshold as usize,
                self.validate_decompression,
                self.compression_kind,
            ));
        }
        self.transport = Some(Framed::new(io, codec));
        self.transport_closed = false;
        self.flush_queue().await
    }

    /// Install the cipher stages. One-shot: a second call is an error.
    pub fn set_encryption(&mut self, decrypt: CipherStage, encrypt: CipherStage) -> Result<()> {
        let framed = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;
        framed.codec_mut().install_cipher(decrypt, encrypt)?;
        debug!("Encryption enabled");
        Ok(())
    }

    /// Install or update the compression stage; a negative threshold removes it.
    pub fn setup_compression(&mut self, threshold: i32, validate: bool) -> Result<()> {
        let framed = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;
        let codec = framed.codec_mut();
        if threshold < 0 {
            codec.remove_compression();
            debug!("Compression disabled");
            return Ok(());
        }
        match codec.compression_mut() {
            Some(stage) => {
                stage.set_threshold(threshold as usize);
                stage.set_validation(validate);
            }
            None => codec.install_compression(CompressionStage::new(
                threshold as usize,
                validate,
                self.compression_kind,
            )),
        }
        debug!(threshold, "Compression enabled");
        Ok(())
    }

    /// Same-context send: drains the queue first so queued packets keep their
    /// order, then writes this packet. Enqueues when no transport exists yet.
    pub async fn send(&mut self, packet: Packet) -> Result<()> {
        if self.transport.is_none() {
            self.queue_packet(packet, None);
            return Ok(());
        }
        self.flush_queue().await?;
        self.write_packet(&packet).await
    }

    /// One external tick: queue flush, listener hook, closed-transport check,
    /// I/O flush, and the periodic rate sample.
    pub async fn tick(&mut self) {
        if self.transport.is_some() && !self.transport_closed {
            if let Err(e) = self.flush_queue().await {
                debug!(error = %e, "Flush failed, transport presumed closed");
                self.transport_closed = true;
            }
        }

        if let Some(listener) = self.listener.as_mut() {
            listener.tick();
        }

        if self.transport_closed && !self.disconnect_handled {
            self.handle_disconnection();
        }

        if let Some(framed) = self.transport.as_mut() {
            if !self.transport_closed {
                let _ = SinkExt::<Bytes>::flush(framed).await;
            }
        }

        self.tick_count += 1;
        if self.tick_count % RATE_SAMPLE_TICKS == 0 {
            self.stats.sample();
            let verdict = self
                .rate_policy
                .as_ref()
                .map(|policy| policy.check(self.stats.average_received));
            if let Some(Err(err)) = verdict {
                self.kick_for_rate(err).await;
            }
        }
    }

    /// Read and process at most one inbound packet.
    ///
    /// Returns `Ok(true)` when a packet was dispatched. No-op while reading is
    /// paused or the transport is gone.
    pub async fn poll_receive(&mut self) -> Result<bool> {
        if self.reading_paused || self.transport_closed {
            return Ok(false);
        }
        let Some(framed) = self.transport.as_mut() else {
            return Ok(false);
        };
        match framed.next().await {
            None => {
                debug!("Transport closed by peer");
                self.transport_closed = true;
                Ok(false)
            }
            Some(Ok(payload)) => match self.process_payload(payload) {
                Ok(()) => Ok(true),
                Err(err) => {
                    self.on_transport_error(err).await;
                    Ok(false)
                }
            },
            Some(Err(err)) => {
                self.on_transport_error(err).await;
                Ok(false)
            }
        }
    }

    fn process_payload(&mut self, payload: Bytes) -> Result<()> {
        self.stats.received = self.stats.received.saturating_add(1);

        let mut buf = PacketBuffer::from_bytes(payload.to_vec());
        let id = buf.read_varint()?;
        let packet = Packet::decode(self.phase, self.receiving, id, &mut buf)?;

        // Pause reads across a structural handoff so no packet is decoded
        // under the old id table.
        let handoff = packet.handoff_phase().filter(|next| *next != self.phase);
        if handoff.is_some() {
            self.reading_paused = true;
        }

        if let Some(listener) = self.listener.as_mut() {
            packet.dispatch(listener.as_mut())?;
        }

        if let Some(next) = handoff {
            self.set_protocol(next);
        }
        Ok(())
    }

    /// Fault escalation entry point.
    ///
    /// Skippable faults drop the packet. The first fatal fault attempts one
    /// graceful disconnect packet then closes; a fault arriving while the first
    /// is being handled closes immediately.
    pub async fn on_transport_error(&mut self, err: ProtocolError) {
        if err.is_skippable() {
            warn!(error = %err, "Dropped malformed packet");
            return;
        }

        match self.fault {
            FaultState::Handling => {
                error!(error = %err, "Double fault, closing immediately");
                self.close_transport().await;
            }
            FaultState::Clear => {
                self.fault = FaultState::Handling;
                self.reading_paused = true;
                let reason = match err {
                    ProtocolError::Timeout => "Timed out".to_string(),
                    ref other => other.to_string(),
                };
                error!(reason = %reason, "Connection fault, disconnecting");
                if let Some(notification) = self.disconnect_notification(&reason) {
                    // Best effort; the close proceeds either way.
                    let _ = self.write_packet(&notification).await;
                }
                self.disconnect(reason).await;
            }
        }
    }

    /// Close the transport if open and record `reason` once. No-op when the
    /// connection is already closed.
    pub async fn disconnect(&mut self, reason: impl Into<String>) {
        if self.transport_closed {
            debug!("disconnect() on a closed connection ignored");
            return;
        }
        let reason = reason.into();
        info!(reason = %reason, "Disconnecting");
        if self.disconnect_reason.is_none() {
            self.disconnect_reason = Some(reason);
        }
        self.close_transport().await;
    }

    async fn close_transport(&mut self) {
        if let Some(framed) = self.transport.as_mut() {
            let _ = SinkExt::<Bytes>::close(framed).await;
        }
        self.transport_closed = true;
    }

    /// One-time bookkeeping once the transport is observed closed: notify the
    /// listener with the recorded reason or a generic fallback.
    pub fn handle_disconnection(&mut self) {
        if self.disconnect_handled {
            warn!("handle_disconnection called twice, ignoring");
            return;
        }
        self.disconnect_handled = true;
        let reason = self
            .disconnect_reason
            .clone()
            .unwrap_or_else(|| "Disconnected".to_string());
        info!(reason = %reason, "Connection closed");
        if let Some(listener) = self.listener.as_mut() {
            listener.disconnected(&reason);
        }
    }

    async fn kick_for_rate(&mut self, err: ProtocolError) {
        warn!(error = %err, "Inbound packet rate exceeded");
        let reason = "Packet rate exceeded".to_string();
        if let Some(notification) = self.disconnect_notification(&reason) {
            let _ = self.write_packet(&notification).await;
        }
        self.disconnect(reason).await;
        self.reading_paused = true;
    }

    /// The disconnect packet appropriate to the current phase, when one exists.
    /// Only the server side has disconnect packets to send.
    fn disconnect_notification(&self, reason: &str) -> Option<Packet> {
        if self.receiving != Direction::Serverbound {
            return None;
        }
        match self.phase {
            ProtocolPhase::Login => Some(Packet::LoginDisconnect {
                reason: reason.to_string(),
            }),
            ProtocolPhase::Play => Some(Packet::Disconnect {
                reason: reason.to_string(),
            }),
            ProtocolPhase::Handshake | ProtocolPhase::Status => None,
        }
    }

    async fn flush_queue(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Ok(());
        }
        loop {
            let entry = self
                .queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            let Some(entry) = entry else {
                return Ok(());
            };
            self.write_packet(&entry.packet).await?;
            if let Some(callback) = entry.on_flush {
                callback();
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut buf = PacketBuffer::with_capacity(64);
        buf.write_varint(packet.id());
        packet.encode(&mut buf)?;

        let framed = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::ConnectionClosed)?;
        framed.send(buf.into_bytes()).await?;
        self.stats.sent = self.stats.sent.saturating_add(1);
        Ok(())
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("receiving", &self.receiving)
            .field("phase", &self.phase)
            .field("state", &self.state())
            .field("reading_paused", &self.reading_paused)
            .finish_non_exhaustive()
    }
}
