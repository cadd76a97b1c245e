//! # Protocol Model
//!
//! Phases, directions, and the typed packet registry.
//!
//! A session moves through four phases, each with its own packet-id namespace:
//! Handshake → Status (server list pings) or Login (key exchange, compression
//! negotiation) → Play. Switching phase atomically swaps the active id table.

use crate::codec::WireEnum;

pub mod listener;
pub mod packet;

pub use listener::{
    ClientLoginHandler, ClientPlayHandler, ClientStatusHandler, HandshakeHandler, LoginHandler,
    PacketListener, PlayHandler, StatusHandler,
};
pub use packet::Packet;

/// Protocol stage with its own packet-id namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolPhase {
    Handshake,
    Status,
    Login,
    Play,
}

impl std::fmt::Display for ProtocolPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProtocolPhase::Handshake => "handshake",
            ProtocolPhase::Status => "status",
            ProtocolPhase::Login => "login",
            ProtocolPhase::Play => "play",
        };
        f.write_str(name)
    }
}

/// Which side a packet travels toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client → server
    Serverbound,
    /// Server → client
    Clientbound,
}

impl Direction {
    /// The direction the other side receives.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Serverbound => Direction::Clientbound,
            Direction::Clientbound => Direction::Serverbound,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::Serverbound => "serverbound",
            Direction::Clientbound => "clientbound",
        };
        f.write_str(name)
    }
}

/// What the client intends after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientIntent {
    Status,
    Login,
    Transfer,
}

impl WireEnum for ClientIntent {
    fn ordinal(self) -> i32 {
        match self {
            ClientIntent::Status => 1,
            ClientIntent::Login => 2,
            ClientIntent::Transfer => 3,
        }
    }

    fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            1 => Some(ClientIntent::Status),
            2 => Some(ClientIntent::Login),
            3 => Some(ClientIntent::Transfer),
            _ => None,
        }
    }
}

impl ClientIntent {
    /// Phase the connection enters once the intention is processed.
    pub fn target_phase(self) -> ProtocolPhase {
        match self {
            ClientIntent::Status => ProtocolPhase::Status,
            ClientIntent::Login | ClientIntent::Transfer => ProtocolPhase::Login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_ordinals_are_stable() {
        for intent in [ClientIntent::Status, ClientIntent::Login, ClientIntent::Transfer] {
            assert_eq!(ClientIntent::from_ordinal(intent.ordinal()), Some(intent));
        }
        assert_eq!(ClientIntent::from_ordinal(0), None);
        assert_eq!(ClientIntent::from_ordinal(4), None);
    }

    #[test]
    fn direction_opposite() {
        assert_eq!(Direction::Serverbound.opposite(), Direction::Clientbound);
        assert_eq!(Direction::Clientbound.opposite(), Direction::Serverbound);
    }
}
