//! Connection-oriented datagram transport used by both processes.
//!
//! A transport hands out [`TransportEvent`]s in arrival order and accepts
//! payloads tagged with a channel and a [`Delivery`] mode. Reliable payloads
//! arrive exactly once and in order per channel; unreliable payloads may be
//! lost, and stale ones are discarded.

mod connection;
mod envelope;
mod memory;
mod stats;
mod tracking;
mod udp;

use std::io;
use std::time::Duration;

pub use connection::PeerState;
pub use envelope::{
    Datagram, DatagramHeader, EnvelopeError, Frame, MAX_DATAGRAM_SIZE, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};
pub use memory::{MemoryHub, MemoryTransport};
pub use stats::{NetworkStats, rand_u64};
pub use tracking::{AckTracker, ReceiveTracker, RttEstimator, sequence_greater_than};
pub use udp::{UdpConfig, UdpTransport};

pub type ChannelId = u8;

/// Transport-local handle for one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Retransmitted until acknowledged, delivered in order.
    Reliable,
    /// Best effort. Out-of-date payloads are dropped on arrival.
    Unreliable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect(PeerId),
    Disconnect(PeerId),
    Receive {
        peer: PeerId,
        channel: ChannelId,
        payload: Vec<u8>,
    },
}

pub trait Transport {
    /// Waits at most `timeout` for the next event. A zero timeout only
    /// returns what is already queued. Transports that cannot block return
    /// `None` as soon as they run dry.
    fn poll(&mut self, timeout: Duration) -> io::Result<Option<TransportEvent>>;

    fn send(
        &mut self,
        peer: PeerId,
        channel: ChannelId,
        delivery: Delivery,
        payload: &[u8],
    ) -> io::Result<()>;

    /// Current round-trip estimate for `peer`, zero when unknown.
    fn round_trip_time(&self, peer: PeerId) -> Duration;

    /// Drops the connection. No local `Disconnect` event is produced.
    fn disconnect(&mut self, peer: PeerId);

    fn stats(&self) -> NetworkStats {
        NetworkStats::default()
    }
}

pub(crate) fn not_connected(peer: PeerId) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        format!("{peer} is not connected"),
    )
}
