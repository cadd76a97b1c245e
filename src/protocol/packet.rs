//! # Packet Registry
//!
//! The typed packet set with its (phase, direction, id) identity tables.
//!
//! Decoding is a closed match over the active phase's id namespace; encoding is
//! the inverse table. Every packet consumes its whole body on decode — trailing
//! bytes are a fault. Packet types whose body faults are recoverable (chat
//! traffic) wrap decode errors as skippable so the connection drops the single
//! packet instead of closing.

use crate::codec::{BlockPos, Document, PacketBuffer};
use crate::error::{ProtocolError, Result};
use crate::protocol::listener::PacketListener;
use crate::protocol::{ClientIntent, Direction, ProtocolPhase};

/// Character bound for hostnames in the intention packet.
const MAX_HOSTNAME: usize = 255;
/// Character bound for player names.
const MAX_PLAYER_NAME: usize = 16;
/// Character bound for chat messages.
const MAX_CHAT: usize = 256;
/// Byte bound for login key exchange blobs.
const MAX_KEY_BYTES: usize = 512;
/// Byte budget for chat document bodies.
const MAX_CHAT_DOCUMENT: usize = 256 * 1024;

/// One protocol packet, immutable once constructed.
///
/// Identity is (phase, direction, id); the variant carries all three at the type
/// level so dispatch never relies on an unchecked cast.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // ---- handshake, serverbound ----
    Intention {
        protocol_version: i32,
        hostname: String,
        port: u16,
        intent: ClientIntent,
    },

    // ---- status, serverbound ----
    StatusRequest,
    PingRequest {
        time: i64,
    },

    // ---- status, clientbound ----
    StatusResponse {
        status: String,
    },
    PongResponse {
        time: i64,
    },

    // ---- login, serverbound ----
    Hello {
        name: String,
        profile_id: u128,
    },
    Key {
        shared_secret: Vec<u8>,
        verify_token: Vec<u8>,
    },
    LoginAcknowledged,

    // ---- login, clientbound ----
    LoginDisconnect {
        reason: String,
    },
    EncryptionRequest {
        server_id: String,
        public_key: Vec<u8>,
        verify_token: Vec<u8>,
    },
    LoginSuccess {
        profile_id: u128,
        name: String,
    },
    SetCompression {
        threshold: i32,
    },

    // ---- play, serverbound ----
    KeepAliveResponse {
        id: i64,
    },
    ChatMessage {
        message: String,
    },
    MovePlayer {
        x: f64,
        y: f64,
        z: f64,
        on_ground: bool,
    },

    // ---- play, clientbound ----
    KeepAlive {
        id: i64,
    },
    Disconnect {
        reason: String,
    },
    SystemChat {
        content: Option<Document>,
        overlay: bool,
    },
    BlockUpdate {
        pos: BlockPos,
        state: i32,
    },
}

impl Packet {
    /// Phase this packet belongs to.
    pub fn phase(&self) -> ProtocolPhase {
        use Packet::*;
        match self {
            Intention { .. } => ProtocolPhase::Handshake,
            StatusRequest | PingRequest { .. } | StatusResponse { .. } | PongResponse { .. } => {
                ProtocolPhase::Status
            }
            Hello { .. } | Key { .. } | LoginAcknowledged | LoginDisconnect { .. }
            | EncryptionRequest { .. } | LoginSuccess { .. } | SetCompression { .. } => {
                ProtocolPhase::Login
            }
            KeepAliveResponse { .. } | ChatMessage { .. } | MovePlayer { .. } | KeepAlive { .. }
            | Disconnect { .. } | SystemChat { .. } | BlockUpdate { .. } => ProtocolPhase::Play,
        }
    }

    /// Direction this packet travels.
    pub fn direction(&self) -> Direction {
        use Packet::*;
        match self {
            Intention { .. } | StatusRequest | PingRequest { .. } | Hello { .. } | Key { .. }
            | LoginAcknowledged | KeepAliveResponse { .. } | ChatMessage { .. }
            | MovePlayer { .. } => Direction::Serverbound,
            StatusResponse { .. } | PongResponse { .. } | LoginDisconnect { .. }
            | EncryptionRequest { .. } | LoginSuccess { .. } | SetCompression { .. }
            | KeepAlive { .. } | Disconnect { .. } | SystemChat { .. } | BlockUpdate { .. } => {
                Direction::Clientbound
            }
        }
    }

    /// Phase-local wire id.
    pub fn id(&self) -> i32 {
        use Packet::*;
        match self {
            Intention { .. } => 0x00,

            StatusRequest => 0x00,
            PingRequest { .. } => 0x01,
            StatusResponse { .. } => 0x00,
            PongResponse { .. } => 0x01,

            Hello { .. } => 0x00,
            Key { .. } => 0x01,
            LoginAcknowledged => 0x02,
            LoginDisconnect { .. } => 0x00,
            EncryptionRequest { .. } => 0x01,
            LoginSuccess { .. } => 0x02,
            SetCompression { .. } => 0x03,

            KeepAliveResponse { .. } => 0x00,
            ChatMessage { .. } => 0x01,
            MovePlayer { .. } => 0x02,
            KeepAlive { .. } => 0x00,
            Disconnect { .. } => 0x01,
            SystemChat { .. } => 0x02,
            BlockUpdate { .. } => 0x03,
        }
    }

    /// Phase the receiver must switch to after processing, if any.
    ///
    /// Only structural handoffs are encoded here; client-driven switches (after
    /// `LoginSuccess`) are made by the caller through `Connection::set_protocol`.
    pub fn handoff_phase(&self) -> Option<ProtocolPhase> {
        match self {
            Packet::Intention { intent, .. } => Some(intent.target_phase()),
            Packet::LoginAcknowledged => Some(ProtocolPhase::Play),
            _ => None,
        }
    }

    /// Serialize the body (without the id prefix).
    pub fn encode(&self, buf: &mut PacketBuffer) -> Result<()> {
        use Packet::*;
        match self {
            Intention {
                protocol_version,
                hostname,
                port,
                intent,
            } => {
                buf.write_varint(*protocol_version);
                buf.write_string(hostname, MAX_HOSTNAME)?;
                buf.write_u16(*port);
                buf.write_enum(*intent);
            }
            StatusRequest | LoginAcknowledged => {}
            PingRequest { time } | PongResponse { time } => buf.write_i64(*time),
            StatusResponse { status } => buf.write_utf(status)?,
            Hello { name, profile_id } => {
                buf.write_string(name, MAX_PLAYER_NAME)?;
                buf.write_uuid(*profile_id);
            }
            Key {
                shared_secret,
                verify_token,
            } => {
                buf.write_byte_array(shared_secret);
                buf.write_byte_array(verify_token);
            }
            LoginDisconnect { reason } | Disconnect { reason } => buf.write_utf(reason)?,
            EncryptionRequest {
                server_id,
                public_key,
                verify_token,
            } => {
                buf.write_string(server_id, 20)?;
                buf.write_byte_array(public_key);
                buf.write_byte_array(verify_token);
            }
            LoginSuccess { profile_id, name } => {
                buf.write_uuid(*profile_id);
                buf.write_string(name, MAX_PLAYER_NAME)?;
            }
            SetCompression { threshold } => buf.write_varint(*threshold),
            KeepAliveResponse { id } | KeepAlive { id } => buf.write_i64(*id),
            ChatMessage { message } => buf.write_string(message, MAX_CHAT)?,
            MovePlayer { x, y, z, on_ground } => {
                buf.write_f64(*x);
                buf.write_f64(*y);
                buf.write_f64(*z);
                buf.write_bool(*on_ground);
            }
            SystemChat { content, overlay } => {
                buf.write_document(content.as_ref())?;
                buf.write_bool(*overlay);
            }
            BlockUpdate { pos, state } => {
                buf.write_block_pos(*pos);
                buf.write_varint(*state);
            }
        }
        Ok(())
    }

    /// Decode a body for the given identity. The whole body must be consumed.
    pub fn decode(
        phase: ProtocolPhase,
        direction: Direction,
        id: i32,
        buf: &mut PacketBuffer,
    ) -> Result<Packet> {
        let packet = decode_body(phase, direction, id, buf);

        // Chat traffic tolerates malformed bodies; drop the packet, keep the session.
        let skippable = matches!(
            (phase, direction, id),
            (ProtocolPhase::Play, Direction::Serverbound, 0x01)
                | (ProtocolPhase::Play, Direction::Clientbound, 0x02)
        );
        let packet = match packet {
            Ok(p) => p,
            Err(e) if skippable && !matches!(e, ProtocolError::InvalidPacketId { .. }) => {
                return Err(ProtocolError::skippable(e));
            }
            Err(e) => return Err(e),
        };

        if buf.remaining() > 0 {
            return Err(ProtocolError::TrailingBytes(buf.remaining()));
        }
        Ok(packet)
    }
}

fn decode_body(
    phase: ProtocolPhase,
    direction: Direction,
    id: i32,
    buf: &mut PacketBuffer,
) -> Result<Packet> {
    use Direction::*;
    use ProtocolPhase::*;

    let packet = match (phase, direction, id) {
        (Handshake, Serverbound, 0x00) => Packet::Intention {
            protocol_version: buf.read_varint()?,
            hostname: buf.read_string(MAX_HOSTNAME)?,
            port: buf.read_u16()?,
            intent: buf.read_enum()?,
        },

        (Status, Serverbound, 0x00) => Packet::StatusRequest,
        (Status, Serverbound, 0x01) => Packet::PingRequest {
            time: buf.read_i64()?,
        },
        (Status, Clientbound, 0x00) => Packet::StatusResponse {
            status: buf.read_utf()?,
        },
        (Status, Clientbound, 0x01) => Packet::PongResponse {
            time: buf.read_i64()?,
        },

        (Login, Serverbound, 0x00) => Packet::Hello {
            name: buf.read_string(MAX_PLAYER_NAME)?,
            profile_id: buf.read_uuid()?,
        },
        (Login, Serverbound, 0x01) => Packet::Key {
            shared_secret: buf.read_byte_array(MAX_KEY_BYTES)?,
            verify_token: buf.read_byte_array(MAX_KEY_BYTES)?,
        },
        (Login, Serverbound, 0x02) => Packet::LoginAcknowledged,
        (Login, Clientbound, 0x00) => Packet::LoginDisconnect {
            reason: buf.read_utf()?,
        },
        (Login, Clientbound, 0x01) => Packet::EncryptionRequest {
            server_id: buf.read_string(20)?,
            public_key: buf.read_byte_array(MAX_KEY_BYTES)?,
            verify_token: buf.read_byte_array(MAX_KEY_BYTES)?,
        },
        (Login, Clientbound, 0x02) => Packet::LoginSuccess {
            profile_id: buf.read_uuid()?,
            name: buf.read_string(MAX_PLAYER_NAME)?,
        },
        (Login, Clientbound, 0x03) => Packet::SetCompression {
            threshold: buf.read_varint()?,
        },

        (Play, Serverbound, 0x00) => Packet::KeepAliveResponse {
            id: buf.read_i64()?,
        },
        (Play, Serverbound, 0x01) => Packet::ChatMessage {
            message: buf.read_string(MAX_CHAT)?,
        },
        (Play, Serverbound, 0x02) => Packet::MovePlayer {
            x: buf.read_f64()?,
            y: buf.read_f64()?,
            z: buf.read_f64()?,
            on_ground: buf.read_bool()?,
        },
        (Play, Clientbound, 0x00) => Packet::KeepAlive {
            id: buf.read_i64()?,
        },
        (Play, Clientbound, 0x01) => Packet::Disconnect {
            reason: buf.read_utf()?,
        },
        (Play, Clientbound, 0x02) => Packet::SystemChat {
            content: buf.read_document_bounded(MAX_CHAT_DOCUMENT)?,
            overlay: buf.read_bool()?,
        },
        (Play, Clientbound, 0x03) => Packet::BlockUpdate {
            pos: buf.read_block_pos()?,
            state: buf.read_varint()?,
        },

        _ => {
            return Err(ProtocolError::InvalidPacketId {
                phase,
                direction,
                id,
            })
        }
    };
    Ok(packet)
}

impl Packet {
    /// Double dispatch to the listener capability for this packet's identity.
    ///
    /// Fails with `ListenerMismatch` when the listener does not expose the
    /// capability — the typed replacement for dispatch-by-unchecked-cast.
    pub fn dispatch(&self, listener: &mut dyn PacketListener) -> Result<()> {
        let mismatch = || ProtocolError::ListenerMismatch {
            phase: self.phase(),
            direction: self.direction(),
        };
        use Packet::*;
        match self {
            Intention {
                protocol_version,
                hostname,
                port,
                intent,
            } => listener.handshake().ok_or_else(mismatch)?.handle_intention(
                *protocol_version,
                hostname,
                *port,
                *intent,
            ),
            StatusRequest => listener
                .status()
                .ok_or_else(mismatch)?
                .handle_status_request(),
            PingRequest { time } => listener
                .status()
                .ok_or_else(mismatch)?
                .handle_ping_request(*time),
            StatusResponse { status } => listener
                .client_status()
                .ok_or_else(mismatch)?
                .handle_status_response(status),
            PongResponse { time } => listener
                .client_status()
                .ok_or_else(mismatch)?
                .handle_pong_response(*time),
            Hello { name, profile_id } => listener
                .login()
                .ok_or_else(mismatch)?
                .handle_hello(name, *profile_id),
            Key {
                shared_secret,
                verify_token,
            } => listener
                .login()
                .ok_or_else(mismatch)?
                .handle_key(shared_secret, verify_token),
            LoginAcknowledged => listener
                .login()
                .ok_or_else(mismatch)?
                .handle_login_acknowledged(),
            LoginDisconnect { reason } => listener
                .client_login()
                .ok_or_else(mismatch)?
                .handle_login_disconnect(reason),
            EncryptionRequest {
                server_id,
                public_key,
                verify_token,
            } => listener
                .client_login()
                .ok_or_else(mismatch)?
                .handle_encryption_request(server_id, public_key, verify_token),
            LoginSuccess { profile_id, name } => listener
                .client_login()
                .ok_or_else(mismatch)?
                .handle_login_success(*profile_id, name),
            SetCompression { threshold } => listener
                .client_login()
                .ok_or_else(mismatch)?
                .handle_set_compression(*threshold),
            KeepAliveResponse { id } => listener
                .play()
                .ok_or_else(mismatch)?
                .handle_keep_alive_response(*id),
            ChatMessage { message } => listener
                .play()
                .ok_or_else(mismatch)?
                .handle_chat_message(message),
            MovePlayer { x, y, z, on_ground } => listener
                .play()
                .ok_or_else(mismatch)?
                .handle_move_player(*x, *y, *z, *on_ground),
            KeepAlive { id } => listener
                .client_play()
                .ok_or_else(mismatch)?
                .handle_keep_alive(*id),
            Disconnect { reason } => listener
                .client_play()
                .ok_or_else(mismatch)?
                .handle_disconnect(reason),
            SystemChat { content, overlay } => listener
                .client_play()
                .ok_or_else(mismatch)?
                .handle_system_chat(content.as_ref(), *overlay),
            BlockUpdate { pos, state } => listener
                .client_play()
                .ok_or_else(mismatch)?
                .handle_block_update(*pos, *state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: Packet) {
        let mut buf = PacketBuffer::new();
        packet.encode(&mut buf).unwrap();
        let decoded =
            Packet::decode(packet.phase(), packet.direction(), packet.id(), &mut buf).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn intention_roundtrip() {
        roundtrip(Packet::Intention {
            protocol_version: 770,
            hostname: "play.example.net".to_string(),
            port: 25565,
            intent: ClientIntent::Login,
        });
    }

    #[test]
    fn login_packets_roundtrip() {
        roundtrip(Packet::Hello {
            name: "alyx".to_string(),
            profile_id: 0xDEAD_BEEF_0000_0001_0000_0000_0000_0042,
        });
        roundtrip(Packet::Key {
            shared_secret: vec![1; 16],
            verify_token: vec![2; 4],
        });
        roundtrip(Packet::SetCompression { threshold: 256 });
        roundtrip(Packet::LoginAcknowledged);
    }

    #[test]
    fn play_packets_roundtrip() {
        roundtrip(Packet::KeepAlive { id: -7 });
        roundtrip(Packet::MovePlayer {
            x: 1.5,
            y: 64.0,
            z: -88.25,
            on_ground: true,
        });
        roundtrip(Packet::BlockUpdate {
            pos: BlockPos::new(-100, 70, 2048),
            state: 9001,
        });
        roundtrip(Packet::SystemChat {
            content: Some(Document::Text("hello".to_string())),
            overlay: false,
        });
    }

    #[test]
    fn unknown_id_rejected() {
        let mut buf = PacketBuffer::new();
        assert!(matches!(
            Packet::decode(ProtocolPhase::Status, Direction::Serverbound, 0x7F, &mut buf),
            Err(ProtocolError::InvalidPacketId { id: 0x7F, .. })
        ));
    }

    #[test]
    fn id_space_is_phase_local() {
        // Id 0x00 decodes to different packets under different phases.
        let mut buf = PacketBuffer::new();
        let status =
            Packet::decode(ProtocolPhase::Status, Direction::Serverbound, 0x00, &mut buf).unwrap();
        assert_eq!(status, Packet::StatusRequest);

        let mut buf = PacketBuffer::new();
        buf.write_i64(42);
        let play =
            Packet::decode(ProtocolPhase::Play, Direction::Serverbound, 0x00, &mut buf).unwrap();
        assert_eq!(play, Packet::KeepAliveResponse { id: 42 });
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut buf = PacketBuffer::new();
        buf.write_i64(1);
        buf.write_u8(0xFF);
        assert!(matches!(
            Packet::decode(ProtocolPhase::Status, Direction::Serverbound, 0x01, &mut buf),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn chat_decode_faults_are_skippable() {
        let mut buf = PacketBuffer::new();
        buf.write_varint(2);
        buf.write_u8(0xC3); // invalid UTF-8 body
        buf.write_u8(0x28);
        let err = Packet::decode(ProtocolPhase::Play, Direction::Serverbound, 0x01, &mut buf)
            .unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn handshake_handoff_follows_intent() {
        let status = Packet::Intention {
            protocol_version: 770,
            hostname: "h".to_string(),
            port: 1,
            intent: ClientIntent::Status,
        };
        assert_eq!(status.handoff_phase(), Some(ProtocolPhase::Status));

        let login = Packet::Intention {
            protocol_version: 770,
            hostname: "h".to_string(),
            port: 1,
            intent: ClientIntent::Login,
        };
        assert_eq!(login.handoff_phase(), Some(ProtocolPhase::Login));
        assert_eq!(
            Packet::LoginAcknowledged.handoff_phase(),
            Some(ProtocolPhase::Play)
        );
        assert_eq!(Packet::StatusRequest.handoff_phase(), None);
    }
}
