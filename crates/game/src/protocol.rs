//! Game packets carried over the transport channels.
//!
//! Every packet starts with a one-byte type tag. Fixed-size parts are
//! plain-old-data records in native byte order; welcome and delta packets
//! append a `u16` count followed by that many [`EntityRecord`]s.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use thiserror::Error;

use crate::entity::{EntityId, EntitySnapshot, Pose};
use crate::movement::JumpFallFlags;
use crate::transport::{ChannelId, Delivery};

pub const DEFAULT_PORT: u16 = 8192;
pub const CHANNEL_COUNT: usize = 3;
pub const MAX_ENTRIES_PER_PACKET: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    /// Handshake and entity lifecycle.
    Control = 0,
    /// Client movement updates and server corrections.
    Movement = 1,
    /// Batched per-tick deltas.
    Updates = 2,
}

impl Channel {
    pub fn id(self) -> ChannelId {
        self as ChannelId
    }

    pub fn from_id(id: ChannelId) -> Option<Self> {
        match id {
            0 => Some(Channel::Control),
            1 => Some(Channel::Movement),
            2 => Some(Channel::Updates),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    PositionUpdate = 0,
    RotationUpdate = 1,
    JumpUpdate = 2,
    PositionCorrection = 3,
    Welcome = 4,
    NewEntity = 5,
    DelEntity = 6,
    EntityChangesUpdate = 7,
}

impl PacketKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => PacketKind::PositionUpdate,
            1 => PacketKind::RotationUpdate,
            2 => PacketKind::JumpUpdate,
            3 => PacketKind::PositionCorrection,
            4 => PacketKind::Welcome,
            5 => PacketKind::NewEntity,
            6 => PacketKind::DelEntity,
            7 => PacketKind::EntityChangesUpdate,
            _ => return None,
        })
    }

    pub fn channel(self) -> Channel {
        match self {
            PacketKind::PositionUpdate
            | PacketKind::RotationUpdate
            | PacketKind::JumpUpdate
            | PacketKind::PositionCorrection => Channel::Movement,
            PacketKind::Welcome | PacketKind::NewEntity | PacketKind::DelEntity => Channel::Control,
            PacketKind::EntityChangesUpdate => Channel::Updates,
        }
    }

    pub fn delivery(self) -> Delivery {
        match self {
            PacketKind::JumpUpdate
            | PacketKind::Welcome
            | PacketKind::NewEntity
            | PacketKind::DelEntity => Delivery::Reliable,
            PacketKind::PositionUpdate
            | PacketKind::RotationUpdate
            | PacketKind::PositionCorrection
            | PacketKind::EntityChangesUpdate => Delivery::Unreliable,
        }
    }
}

/// Wire layout of one entity pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EntityRecord {
    pub idx: u32,
    pub position: [f32; 3],
    pub rotation: f32,
}

impl From<&EntitySnapshot> for EntityRecord {
    fn from(snapshot: &EntitySnapshot) -> Self {
        Self {
            idx: snapshot.id.0,
            position: snapshot.pose.position.to_array(),
            rotation: snapshot.pose.rotation,
        }
    }
}

impl From<EntityRecord> for EntitySnapshot {
    fn from(record: EntityRecord) -> Self {
        EntitySnapshot::new(
            EntityId(record.idx),
            Pose::new(Vec3::from_array(record.position), record.rotation),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    #[error("unexpected packet type {kind} on channel {channel}")]
    UnknownType { channel: ChannelId, kind: u8 },
    #[error("packet truncated: needed {needed} bytes, got {len}")]
    Truncated { needed: usize, len: usize },
    #[error("{extra} trailing bytes after packet")]
    TrailingBytes { extra: usize },
    #[error("non-finite value in {0:?}")]
    NotFinite(PacketKind),
}

/// Packets sent by clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientPacket {
    PositionUpdate { position: Vec3 },
    RotationUpdate { rotation: f32 },
    JumpUpdate,
}

impl ClientPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            ClientPacket::PositionUpdate { .. } => PacketKind::PositionUpdate,
            ClientPacket::RotationUpdate { .. } => PacketKind::RotationUpdate,
            ClientPacket::JumpUpdate => PacketKind::JumpUpdate,
        }
    }

    pub fn channel(&self) -> Channel {
        self.kind().channel()
    }

    pub fn delivery(&self) -> Delivery {
        self.kind().delivery()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.push(self.kind() as u8);
        match self {
            ClientPacket::PositionUpdate { position } => put(&mut buf, &position.to_array()),
            ClientPacket::RotationUpdate { rotation } => put(&mut buf, rotation),
            ClientPacket::JumpUpdate => {}
        }
        buf
    }

    pub fn decode(channel: ChannelId, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, mut reader) = open(channel, bytes)?;
        let packet = match kind {
            PacketKind::PositionUpdate => ClientPacket::PositionUpdate {
                position: Vec3::from_array(reader.read::<[f32; 3]>()?),
            },
            PacketKind::RotationUpdate => ClientPacket::RotationUpdate {
                rotation: reader.read::<f32>()?,
            },
            PacketKind::JumpUpdate => ClientPacket::JumpUpdate,
            _ => {
                return Err(ProtocolError::UnknownType {
                    channel,
                    kind: kind as u8,
                });
            }
        };
        reader.finish()?;

        let finite = match packet {
            ClientPacket::PositionUpdate { position } => position.is_finite(),
            ClientPacket::RotationUpdate { rotation } => rotation.is_finite(),
            ClientPacket::JumpUpdate => true,
        };
        if !finite {
            return Err(ProtocolError::NotFinite(kind));
        }
        Ok(packet)
    }
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    Welcome {
        assigned_id: EntityId,
        entities: Vec<EntitySnapshot>,
    },
    NewEntity {
        id: EntityId,
    },
    DelEntity {
        id: EntityId,
    },
    EntityChanges {
        entities: Vec<EntitySnapshot>,
    },
    PositionCorrection {
        position: Vec3,
        jump_fall: JumpFallFlags,
    },
}

impl ServerPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            ServerPacket::Welcome { .. } => PacketKind::Welcome,
            ServerPacket::NewEntity { .. } => PacketKind::NewEntity,
            ServerPacket::DelEntity { .. } => PacketKind::DelEntity,
            ServerPacket::EntityChanges { .. } => PacketKind::EntityChangesUpdate,
            ServerPacket::PositionCorrection { .. } => PacketKind::PositionCorrection,
        }
    }

    pub fn channel(&self) -> Channel {
        self.kind().channel()
    }

    pub fn delivery(&self) -> Delivery {
        self.kind().delivery()
    }

    /// Encodes the packet. Entity lists longer than
    /// [`MAX_ENTRIES_PER_PACKET`] are cut to that length.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.push(self.kind() as u8);
        match self {
            ServerPacket::Welcome {
                assigned_id,
                entities,
            } => {
                put(&mut buf, &assigned_id.0);
                put_records(&mut buf, entities);
            }
            ServerPacket::NewEntity { id } | ServerPacket::DelEntity { id } => {
                put(&mut buf, &id.0);
            }
            ServerPacket::EntityChanges { entities } => put_records(&mut buf, entities),
            ServerPacket::PositionCorrection {
                position,
                jump_fall,
            } => {
                put(&mut buf, &position.to_array());
                put(&mut buf, &jump_fall.bits());
            }
        }
        buf
    }

    pub fn decode(channel: ChannelId, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, mut reader) = open(channel, bytes)?;
        let packet = match kind {
            PacketKind::Welcome => {
                let assigned_id = EntityId(reader.read::<u32>()?);
                ServerPacket::Welcome {
                    assigned_id,
                    entities: reader.read_records()?,
                }
            }
            PacketKind::NewEntity => ServerPacket::NewEntity {
                id: EntityId(reader.read::<u32>()?),
            },
            PacketKind::DelEntity => ServerPacket::DelEntity {
                id: EntityId(reader.read::<u32>()?),
            },
            PacketKind::EntityChangesUpdate => ServerPacket::EntityChanges {
                entities: reader.read_records()?,
            },
            PacketKind::PositionCorrection => ServerPacket::PositionCorrection {
                position: Vec3::from_array(reader.read::<[f32; 3]>()?),
                jump_fall: JumpFallFlags::from_bits_truncate(reader.read::<u8>()?),
            },
            _ => {
                return Err(ProtocolError::UnknownType {
                    channel,
                    kind: kind as u8,
                });
            }
        };
        reader.finish()?;
        Ok(packet)
    }
}

/// Size in bytes of the fixed correction payload, tag excluded.
pub const CORRECTION_PAYLOAD_SIZE: usize =
    std::mem::size_of::<[f32; 3]>() + std::mem::size_of::<u8>();

fn put<T: Pod>(buf: &mut Vec<u8>, value: &T) {
    buf.extend_from_slice(bytemuck::bytes_of(value));
}

fn put_records(buf: &mut Vec<u8>, entities: &[EntitySnapshot]) {
    let count = entities.len().min(MAX_ENTRIES_PER_PACKET);
    if count < entities.len() {
        log::warn!(
            "dropping {} entity records over the per-packet limit",
            entities.len() - count
        );
    }
    put(buf, &(count as u16));
    for snapshot in &entities[..count] {
        put(buf, &EntityRecord::from(snapshot));
    }
}

fn open(channel: ChannelId, bytes: &[u8]) -> Result<(PacketKind, Reader<'_>), ProtocolError> {
    let expected = Channel::from_id(channel).ok_or(ProtocolError::UnknownChannel(channel))?;
    let (&tag, _) = bytes.split_first().ok_or(ProtocolError::Empty)?;

    match PacketKind::from_byte(tag) {
        Some(kind) if kind.channel() == expected => Ok((kind, Reader { bytes, offset: 1 })),
        _ => Err(ProtocolError::UnknownType { channel, kind: tag }),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn read<T: Pod>(&mut self) -> Result<T, ProtocolError> {
        let end = self.offset + std::mem::size_of::<T>();
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(ProtocolError::Truncated {
                needed: end,
                len: self.bytes.len(),
            })?;
        self.offset = end;
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    fn read_records(&mut self) -> Result<Vec<EntitySnapshot>, ProtocolError> {
        let count = self.read::<u16>()? as usize;
        let needed = self.offset + count * std::mem::size_of::<EntityRecord>();
        if needed > self.bytes.len() {
            return Err(ProtocolError::Truncated {
                needed,
                len: self.bytes.len(),
            });
        }

        (0..count)
            .map(|_| self.read::<EntityRecord>().map(EntitySnapshot::from))
            .collect()
    }

    fn finish(self) -> Result<(), ProtocolError> {
        match self.bytes.len() - self.offset {
            0 => Ok(()),
            extra => Err(ProtocolError::TrailingBytes { extra }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: u32, x: f32) -> EntitySnapshot {
        EntitySnapshot::new(EntityId(id), Pose::new(Vec3::new(x, 2.0, 0.5), 1.25))
    }

    #[test]
    fn entity_record_is_twenty_bytes() {
        assert_eq!(std::mem::size_of::<EntityRecord>(), 20);
    }

    #[test]
    fn client_packets_have_documented_sizes() {
        let position = ClientPacket::PositionUpdate {
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        assert_eq!(position.encode().len(), 13);
        assert_eq!(ClientPacket::RotationUpdate { rotation: 0.5 }.encode().len(), 5);
        assert_eq!(ClientPacket::JumpUpdate.encode(), vec![2]);
    }

    #[test]
    fn server_packets_have_documented_sizes() {
        let welcome = ServerPacket::Welcome {
            assigned_id: EntityId(3),
            entities: vec![snapshot(0, 1.0), snapshot(1, 2.0)],
        };
        assert_eq!(welcome.encode().len(), 1 + 4 + 2 + 2 * 20);

        let changes = ServerPacket::EntityChanges {
            entities: vec![snapshot(4, 1.0)],
        };
        assert_eq!(changes.encode().len(), 1 + 2 + 20);

        assert_eq!(ServerPacket::NewEntity { id: EntityId(9) }.encode().len(), 5);
        assert_eq!(ServerPacket::DelEntity { id: EntityId(9) }.encode().len(), 5);

        let correction = ServerPacket::PositionCorrection {
            position: Vec3::ZERO,
            jump_fall: JumpFallFlags::FALLING,
        };
        assert_eq!(correction.encode().len(), 1 + CORRECTION_PAYLOAD_SIZE);
    }

    #[test]
    fn welcome_decodes_on_control_channel() {
        let packet = ServerPacket::Welcome {
            assigned_id: EntityId(2),
            entities: vec![snapshot(0, -4.0), snapshot(1, 8.0)],
        };
        let bytes = packet.encode();

        assert_eq!(ServerPacket::decode(Channel::Control.id(), &bytes), Ok(packet));
    }

    #[test]
    fn correction_keeps_flag_bits() {
        let packet = ServerPacket::PositionCorrection {
            position: Vec3::new(0.0, 1.0, 4.5),
            jump_fall: JumpFallFlags::JUMPING,
        };
        let bytes = packet.encode();
        assert_eq!(*bytes.last().unwrap(), 1);
        assert_eq!(ServerPacket::decode(Channel::Movement.id(), &bytes), Ok(packet));
    }

    #[test]
    fn packet_on_wrong_channel_is_rejected() {
        let bytes = ServerPacket::NewEntity { id: EntityId(1) }.encode();
        assert_eq!(
            ServerPacket::decode(Channel::Updates.id(), &bytes),
            Err(ProtocolError::UnknownType {
                channel: 2,
                kind: 5
            })
        );
    }

    #[test]
    fn client_decoder_refuses_server_family() {
        let bytes = ServerPacket::PositionCorrection {
            position: Vec3::ZERO,
            jump_fall: JumpFallFlags::empty(),
        }
        .encode();
        assert!(matches!(
            ClientPacket::decode(Channel::Movement.id(), &bytes),
            Err(ProtocolError::UnknownType { kind: 3, .. })
        ));
    }

    #[test]
    fn unknown_tag_and_channel() {
        assert_eq!(
            ClientPacket::decode(1, &[42]),
            Err(ProtocolError::UnknownType {
                channel: 1,
                kind: 42
            })
        );
        assert_eq!(
            ClientPacket::decode(7, &[0]),
            Err(ProtocolError::UnknownChannel(7))
        );
        assert_eq!(ClientPacket::decode(1, &[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let bytes = ClientPacket::PositionUpdate { position: Vec3::ONE }.encode();
        assert!(matches!(
            ClientPacket::decode(1, &bytes[..7]),
            Err(ProtocolError::Truncated { needed: 13, len: 7 })
        ));
    }

    #[test]
    fn count_beyond_payload_is_truncated() {
        let mut bytes = ServerPacket::EntityChanges {
            entities: vec![snapshot(1, 0.0)],
        }
        .encode();
        bytes[1] = 3;
        assert!(matches!(
            ServerPacket::decode(2, &bytes),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = ClientPacket::RotationUpdate { rotation: 0.0 }.encode();
        bytes.push(0);
        assert_eq!(
            ClientPacket::decode(1, &bytes),
            Err(ProtocolError::TrailingBytes { extra: 1 })
        );
    }

    #[test]
    fn non_finite_movement_is_rejected() {
        let bytes = ClientPacket::PositionUpdate {
            position: Vec3::new(0.0, f32::NAN, 0.0),
        }
        .encode();
        assert_eq!(
            ClientPacket::decode(1, &bytes),
            Err(ProtocolError::NotFinite(PacketKind::PositionUpdate))
        );

        let bytes = ClientPacket::RotationUpdate {
            rotation: f32::INFINITY,
        }
        .encode();
        assert_eq!(
            ClientPacket::decode(1, &bytes),
            Err(ProtocolError::NotFinite(PacketKind::RotationUpdate))
        );
    }

    #[test]
    fn channel_and_delivery_table() {
        assert_eq!(ClientPacket::JumpUpdate.delivery(), Delivery::Reliable);
        assert_eq!(
            ClientPacket::PositionUpdate { position: Vec3::ZERO }.delivery(),
            Delivery::Unreliable
        );
        assert_eq!(PacketKind::Welcome.channel(), Channel::Control);
        assert_eq!(PacketKind::EntityChangesUpdate.channel(), Channel::Updates);
        assert_eq!(PacketKind::EntityChangesUpdate.delivery(), Delivery::Unreliable);
        assert_eq!(PacketKind::DelEntity.delivery(), Delivery::Reliable);
    }
}
