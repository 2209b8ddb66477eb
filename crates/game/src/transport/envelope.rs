use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use super::ChannelId;

pub const MAX_DATAGRAM_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x484F_5050;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct DatagramHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl DatagramHeader {
    pub fn new(sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Frame {
    Connect {
        client_salt: u64,
    },
    Accept {
        client_salt: u64,
    },
    Deny {
        reason: String,
    },
    Disconnect,
    Ping {
        timestamp_us: u64,
    },
    Pong {
        timestamp_us: u64,
    },
    /// Carries only the header acknowledgements.
    Ack,
    Message {
        channel: ChannelId,
        /// Per-peer reliable ordering number, absent for unreliable payloads.
        reliable_sequence: Option<u32>,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Datagram {
    pub header: DatagramHeader,
    pub frame: Frame,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("datagram of {0} bytes exceeds the {MAX_DATAGRAM_SIZE} byte limit")]
    TooLarge(usize),
}

impl Datagram {
    pub fn new(header: DatagramHeader, frame: Frame) -> Self {
        Self { header, frame }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, EnvelopeError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self).map_err(EnvelopeError::Serialize)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(EnvelopeError::TooLarge(bytes.len()));
        }
        Ok(bytes.to_vec())
    }

    /// Validates and decodes a received datagram. The input is copied into
    /// an aligned buffer first since socket buffers carry no alignment.
    pub fn deserialize(data: &[u8]) -> Result<Self, EnvelopeError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(EnvelopeError::Deserialize)
    }
}
