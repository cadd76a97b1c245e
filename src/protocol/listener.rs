//! # Listener Capabilities
//!
//! The capability interface packets double-dispatch into.
//!
//! A connection holds exactly one listener at a time. The listener opts into
//! per-(phase, direction) capabilities by overriding the accessor for that
//! capability; dispatching a packet whose capability accessor returns `None`
//! fails with `ListenerMismatch` instead of an unchecked cast.

use crate::codec::{BlockPos, Document};
use crate::error::Result;
use crate::protocol::ClientIntent;

/// Handler registered on a connection.
///
/// `tick` is the periodic hook the connection calls once per external tick;
/// `disconnected` fires exactly once when the transport is observed closed.
pub trait PacketListener: Send {
    /// Periodic work hook, driven by `Connection::tick`.
    fn tick(&mut self) {}

    /// One-time disconnect notification with the recorded reason.
    fn disconnected(&mut self, _reason: &str) {}

    // Capability accessors; a listener overrides the phases it can handle.

    fn handshake(&mut self) -> Option<&mut dyn HandshakeHandler> {
        None
    }

    fn status(&mut self) -> Option<&mut dyn StatusHandler> {
        None
    }

    fn login(&mut self) -> Option<&mut dyn LoginHandler> {
        None
    }

    fn play(&mut self) -> Option<&mut dyn PlayHandler> {
        None
    }

    fn client_status(&mut self) -> Option<&mut dyn ClientStatusHandler> {
        None
    }

    fn client_login(&mut self) -> Option<&mut dyn ClientLoginHandler> {
        None
    }

    fn client_play(&mut self) -> Option<&mut dyn ClientPlayHandler> {
        None
    }
}

/// Serverbound handshake packets.
pub trait HandshakeHandler {
    fn handle_intention(
        &mut self,
        protocol_version: i32,
        hostname: &str,
        port: u16,
        intent: ClientIntent,
    ) -> Result<()>;
}

/// Serverbound status packets.
pub trait StatusHandler {
    fn handle_status_request(&mut self) -> Result<()>;
    fn handle_ping_request(&mut self, time: i64) -> Result<()>;
}

/// Serverbound login packets.
pub trait LoginHandler {
    fn handle_hello(&mut self, name: &str, profile_id: u128) -> Result<()>;
    fn handle_key(&mut self, shared_secret: &[u8], verify_token: &[u8]) -> Result<()>;
    fn handle_login_acknowledged(&mut self) -> Result<()>;
}

/// Serverbound play packets.
pub trait PlayHandler {
    fn handle_keep_alive_response(&mut self, id: i64) -> Result<()>;
    fn handle_chat_message(&mut self, message: &str) -> Result<()>;
    fn handle_move_player(&mut self, x: f64, y: f64, z: f64, on_ground: bool) -> Result<()>;
}

/// Clientbound status packets.
pub trait ClientStatusHandler {
    fn handle_status_response(&mut self, status: &str) -> Result<()>;
    fn handle_pong_response(&mut self, time: i64) -> Result<()>;
}

/// Clientbound login packets.
pub trait ClientLoginHandler {
    fn handle_login_disconnect(&mut self, reason: &str) -> Result<()>;
    fn handle_encryption_request(
        &mut self,
        server_id: &str,
        public_key: &[u8],
        verify_token: &[u8],
    ) -> Result<()>;
    fn handle_login_success(&mut self, profile_id: u128, name: &str) -> Result<()>;
    fn handle_set_compression(&mut self, threshold: i32) -> Result<()>;
}

/// Clientbound play packets.
pub trait ClientPlayHandler {
    fn handle_keep_alive(&mut self, id: i64) -> Result<()>;
    fn handle_disconnect(&mut self, reason: &str) -> Result<()>;
    fn handle_system_chat(&mut self, content: Option<&Document>, overlay: bool) -> Result<()>;
    fn handle_block_update(&mut self, pos: BlockPos, state: i32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::Packet;

    /// Listener that only speaks the status phase.
    struct StatusOnly {
        pings: Vec<i64>,
    }

    impl PacketListener for StatusOnly {
        fn status(&mut self) -> Option<&mut dyn StatusHandler> {
            Some(self)
        }
    }

    impl StatusHandler for StatusOnly {
        fn handle_status_request(&mut self) -> Result<()> {
            Ok(())
        }

        fn handle_ping_request(&mut self, time: i64) -> Result<()> {
            self.pings.push(time);
            Ok(())
        }
    }

    #[test]
    fn dispatch_routes_to_capability() {
        let mut listener = StatusOnly { pings: vec![] };
        Packet::PingRequest { time: 99 }
            .dispatch(&mut listener)
            .unwrap();
        assert_eq!(listener.pings, vec![99]);
    }

    #[test]
    fn missing_capability_is_listener_mismatch() {
        let mut listener = StatusOnly { pings: vec![] };
        let err = Packet::ChatMessage {
            message: "hi".to_string(),
        }
        .dispatch(&mut listener)
        .unwrap_err();
        assert!(matches!(err, ProtocolError::ListenerMismatch { .. }));
    }
}
