pub mod angle;
pub mod curve;
pub mod entity;
pub mod movement;
pub mod protocol;
pub mod time;
pub mod transport;
pub mod world;

pub use angle::{lerp_angle, normalize_yaw, shortest_angle_delta};
pub use curve::{Curve, FALL_CURVE, JUMP_CURVE};
pub use entity::{EntityId, EntitySnapshot, Pose};
pub use movement::{
    JUMP_DURATION, JUMP_HEIGHT, JumpFall, JumpFallFlags, JumpPhase, MOVEMENT_SPEED, SPIN_SPEED,
    sample_jump_fall,
};
pub use protocol::{
    CHANNEL_COUNT, Channel, ClientPacket, DEFAULT_PORT, EntityRecord, PacketKind, ProtocolError,
    ServerPacket,
};
pub use time::{SEND_RATE_LIMIT, TICK_PERIOD};
pub use transport::{
    ChannelId, Delivery, MemoryHub, MemoryTransport, NetworkStats, PeerId, Transport,
    TransportEvent, UdpConfig, UdpTransport,
};
pub use world::{
    Correction, MAX_ENTITIES, RejectReason, Validation, ValidationLimits, World, WorldError,
};
