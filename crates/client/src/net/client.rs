use std::io;
use std::time::{Duration, Instant};

use hopper::{
    ClientPacket, EntityId, NetworkStats, PeerId, ServerPacket, Transport, TransportEvent,
};

use super::config::ClientConfig;
use super::outgoing::OutgoingChannel;
use crate::player::PlayerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the transport handshake and the welcome packet.
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Packet(ServerPacket),
    Disconnected,
}

pub struct NetworkClient<T: Transport> {
    transport: T,
    server: PeerId,
    state: ConnectionState,
    local_id: Option<EntityId>,
    outgoing: OutgoingChannel,
    connect_started: Instant,
    config: ClientConfig,
}

impl<T: Transport> NetworkClient<T> {
    pub fn new(transport: T, server: PeerId, config: ClientConfig) -> Self {
        Self {
            transport,
            server,
            state: ConnectionState::Connecting,
            local_id: None,
            outgoing: OutgoingChannel::new(config.send_rate_limit),
            connect_started: hopper::time::now(),
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn local_id(&self) -> Option<EntityId> {
        self.local_id
    }

    pub fn server(&self) -> PeerId {
        self.server
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn round_trip_time(&self) -> Duration {
        self.transport.round_trip_time(self.server)
    }

    pub fn stats(&self) -> NetworkStats {
        self.transport.stats()
    }

    /// True while still waiting for the welcome past the configured timeout.
    pub fn is_overdue(&self) -> bool {
        self.state == ConnectionState::Connecting
            && hopper::time::elapsed_since(self.connect_started) > self.config.connect_timeout
    }

    /// Drains everything the transport has queued without waiting.
    pub fn poll(&mut self) -> io::Result<Vec<NetworkEvent>> {
        let mut events = Vec::new();

        while let Some(event) = self.transport.poll(Duration::ZERO)? {
            match event {
                TransportEvent::Connect(peer) if peer == self.server => {
                    log::info!("Transport connected, waiting for welcome");
                }
                TransportEvent::Disconnect(peer) if peer == self.server => {
                    log::warn!("Lost connection to server");
                    self.state = ConnectionState::Disconnected;
                    self.local_id = None;
                    self.outgoing.set_enabled(false);
                    events.push(NetworkEvent::Disconnected);
                }
                TransportEvent::Receive {
                    peer,
                    channel,
                    payload,
                } if peer == self.server => match ServerPacket::decode(channel, &payload) {
                    Ok(packet) => {
                        if let ServerPacket::Welcome { assigned_id, .. } = &packet {
                            self.on_welcome(*assigned_id);
                        }
                        events.push(NetworkEvent::Packet(packet));
                    }
                    Err(err) => log::warn!("Discarding server packet: {err}"),
                },
                other => log::debug!("Ignoring transport event {other:?}"),
            }
        }

        Ok(events)
    }

    fn on_welcome(&mut self, assigned_id: EntityId) {
        match self.local_id {
            // Crowded servers split the welcome over several packets.
            Some(previous) if previous == assigned_id => {
                log::debug!("Welcome continuation for entity {assigned_id}");
                return;
            }
            Some(previous) => log::warn!("Welcomed again as {assigned_id} (was {previous})"),
            None => log::info!("Welcomed as entity {assigned_id}"),
        }
        self.local_id = Some(assigned_id);
        self.state = ConnectionState::Connected;
        self.outgoing.set_enabled(true);
    }

    /// Sends the packet for `event` unless the rate limiter or the
    /// connection state holds it back. Returns whether anything was sent.
    pub fn send_event(&mut self, event: &PlayerEvent, now: Instant) -> io::Result<bool> {
        match self.outgoing.packet_for(event, now) {
            Some(packet) => {
                self.send(&packet)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sends rate-limited updates still waiting since the last event.
    /// Returns how many packets left.
    pub fn flush(&mut self, now: Instant) -> io::Result<usize> {
        let packets = self.outgoing.flush(now);
        for packet in &packets {
            self.send(packet)?;
        }
        Ok(packets.len())
    }

    /// Forgets held-back movement, e.g. once the server corrected it.
    pub fn discard_pending(&mut self) {
        self.outgoing.clear_pending();
    }

    pub fn send(&mut self, packet: &ClientPacket) -> io::Result<()> {
        if !self.is_connected() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no welcome from server yet",
            ));
        }
        self.transport.send(
            self.server,
            packet.channel().id(),
            packet.delivery(),
            &packet.encode(),
        )
    }

    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.transport.disconnect(self.server);
            self.state = ConnectionState::Disconnected;
            self.local_id = None;
            self.outgoing.set_enabled(false);
            log::info!("Disconnected from server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use hopper::{Channel, Delivery, MemoryHub, MemoryTransport};

    fn connected_pair() -> (MemoryHub, MemoryTransport, NetworkClient<MemoryTransport>) {
        let hub = MemoryHub::new();
        let server = hub.endpoint();
        let transport = hub.endpoint();
        hub.connect(server.id(), transport.id());
        let client = NetworkClient::new(transport, server.id(), ClientConfig::default());
        (hub, server, client)
    }

    fn welcome(server: &mut MemoryTransport, client: PeerId, id: u32) {
        let packet = ServerPacket::Welcome {
            assigned_id: EntityId(id),
            entities: Vec::new(),
        };
        server
            .send(client, Channel::Control.id(), Delivery::Reliable, &packet.encode())
            .unwrap();
    }

    #[test]
    fn welcome_connects_and_enables_sends() {
        let (hub, mut server, mut client) = connected_pair();
        let client_peer = client.transport().id();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(client.send(&ClientPacket::JumpUpdate).is_err());

        welcome(&mut server, client_peer, 4);
        let events = client.poll().unwrap();

        assert_eq!(events.len(), 1);
        assert!(client.is_connected());
        assert_eq!(client.local_id(), Some(EntityId(4)));

        let sent = client
            .send_event(
                &PlayerEvent::Moved {
                    position: Vec3::X,
                },
                Instant::now(),
            )
            .unwrap();
        assert!(sent);
        // Connect event plus the position update.
        assert_eq!(hub.pending(server.id()), 2);
    }

    #[test]
    fn repeated_welcome_for_same_id_continues() {
        let (hub, mut server, mut client) = connected_pair();
        let client_peer = client.transport().id();
        welcome(&mut server, client_peer, 2);
        client.poll().unwrap();

        let now = Instant::now();
        let moved = PlayerEvent::Moved { position: Vec3::X };
        assert!(client.send_event(&moved, now).unwrap());
        assert!(!client.send_event(&moved, now).unwrap());

        welcome(&mut server, client_peer, 2);
        assert_eq!(client.poll().unwrap().len(), 1);
        assert_eq!(client.local_id(), Some(EntityId(2)));
        // The limiter was not reset by the continuation.
        assert!(!client.send_event(&moved, now).unwrap());
        assert_eq!(hub.pending(server.id()), 2);
    }

    #[test]
    fn held_back_position_is_flushed() {
        let (hub, mut server, mut client) = connected_pair();
        let client_peer = client.transport().id();
        welcome(&mut server, client_peer, 0);
        client.poll().unwrap();

        let start = Instant::now();
        client
            .send_event(&PlayerEvent::Moved { position: Vec3::X }, start)
            .unwrap();
        client
            .send_event(&PlayerEvent::Moved { position: Vec3::Y }, start)
            .unwrap();
        assert_eq!(hub.pending(server.id()), 2);

        assert_eq!(client.flush(start + Duration::from_millis(100)).unwrap(), 1);
        assert_eq!(client.flush(start + Duration::from_millis(300)).unwrap(), 0);
        assert_eq!(hub.pending(server.id()), 3);
    }

    #[test]
    fn malformed_packet_is_dropped() {
        let (_hub, mut server, mut client) = connected_pair();
        let client_peer = client.transport().id();
        server
            .send(client_peer, Channel::Updates.id(), Delivery::Unreliable, &[7, 1])
            .unwrap();

        assert!(client.poll().unwrap().is_empty());
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[test]
    fn transport_disconnect_resets_state() {
        let (_hub, mut server, mut client) = connected_pair();
        let client_peer = client.transport().id();
        welcome(&mut server, client_peer, 0);
        client.poll().unwrap();

        server.disconnect(client_peer);
        let events = client.poll().unwrap();

        assert_eq!(events, vec![NetworkEvent::Disconnected]);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.local_id(), None);
    }
}
