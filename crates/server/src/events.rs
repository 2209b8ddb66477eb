use std::fmt;

use hopper::{EntityId, PeerId, RejectReason};

/// Things worth showing an operator. Headless servers only log them.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PeerConnected { peer: PeerId, entity: EntityId },
    PeerDisconnected { peer: PeerId, entity: EntityId },
    ConnectionRefused { peer: PeerId, reason: String },
    MovementRejected { entity: EntityId, reason: RejectReason },
    ProtocolWarning { peer: PeerId, message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl ServerEvent {
    pub fn severity(&self) -> Severity {
        match self {
            ServerEvent::PeerConnected { .. }
            | ServerEvent::PeerDisconnected { .. }
            | ServerEvent::MovementRejected { .. } => Severity::Info,
            ServerEvent::ConnectionRefused { .. } | ServerEvent::ProtocolWarning { .. } => {
                Severity::Warn
            }
            ServerEvent::Error { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEvent::PeerConnected { peer, entity } => {
                write!(f, "{peer} joined as entity {entity}")
            }
            ServerEvent::PeerDisconnected { peer, entity } => {
                write!(f, "{peer} left, entity {entity} freed")
            }
            ServerEvent::ConnectionRefused { peer, reason } => {
                write!(f, "refused {peer}: {reason}")
            }
            ServerEvent::MovementRejected { entity, reason } => {
                write!(f, "corrected entity {entity}: {reason}")
            }
            ServerEvent::ProtocolWarning { peer, message } => write!(f, "{peer}: {message}"),
            ServerEvent::Error { message } => f.write_str(message),
        }
    }
}
