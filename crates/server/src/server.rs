use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use glam::Vec3;
use hopper::time::{elapsed_since, now, remaining};
use hopper::{
    ClientPacket, EntityId, JumpPhase, NetworkStats, PeerId, ServerPacket, Transport,
    TransportEvent, UdpTransport, Validation, World, WorldError,
};

use crate::config::ServerConfig;
use crate::events::ServerEvent;

/// Entity records per `Welcome` or `EntityChanges` packet, sized to stay
/// inside one datagram.
pub const UPDATE_BATCH: usize = 48;

/// Oldest events are dropped past this many undrained ones.
const EVENT_BACKLOG: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerCounters {
    pub connects: u64,
    pub disconnects: u64,
    pub refused: u64,
    pub corrections: u64,
    pub protocol_errors: u64,
    pub updates_sent: u64,
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u64,
    pub uptime_secs: u64,
    pub peer_count: usize,
    pub entity_count: usize,
    pub capacity: usize,
    pub counters: ServerCounters,
    pub network_stats: NetworkStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub id: EntityId,
    pub peer: PeerId,
    pub position: Vec3,
    pub rotation: f32,
    pub phase: JumpPhase,
    pub rtt: Duration,
}

pub struct GameServer<T: Transport> {
    transport: T,
    config: ServerConfig,
    world: World,
    peers: HashMap<PeerId, EntityId>,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ServerEvent>,
    counters: ServerCounters,
    start_time: Instant,
}

impl GameServer<UdpTransport> {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }
}

impl<T: Transport> GameServer<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self {
            transport,
            world: World::new(config.max_entities, config.limits),
            config,
            peers: HashMap::new(),
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
            counters: ServerCounters::default(),
            start_time: now(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn entity_of(&self, peer: PeerId) -> Option<EntityId> {
        self.peers.get(&peer).copied()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// Ticks until the running flag is cleared, then drops every peer.
    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            let started = now();
            self.tick_once();
            // Headless: everything was already logged where it happened.
            self.pending_events.clear();
            std::thread::sleep(remaining(
                self.config.tick_period,
                elapsed_since(started),
            ));
        }
        self.shutdown_connections();
    }

    /// One loop iteration: simulate, broadcast, then service the transport
    /// for whatever is left of the tick period.
    pub fn tick_once(&mut self) {
        let started = now();
        self.step();
        self.broadcast_changes();

        let budget = remaining(self.config.tick_period, elapsed_since(started));
        if let Err(err) = self.service(budget) {
            log::error!("Transport error: {err}");
            self.push_event(ServerEvent::Error {
                message: format!("Transport error: {err}"),
            });
        }
    }

    pub fn step(&mut self) {
        self.world.step(self.config.tick_period);
    }

    /// Sends one tick's worth of changes to every peer. Nothing goes out
    /// when nothing changed, and missed updates are never resent.
    pub fn broadcast_changes(&mut self) {
        let Some(entities) = self.world.take_changes() else {
            return;
        };
        for batch in entities.chunks(UPDATE_BATCH) {
            self.broadcast(
                &ServerPacket::EntityChanges {
                    entities: batch.to_vec(),
                },
                None,
            );
        }
        self.counters.updates_sent += 1;
    }

    /// Handles transport events in arrival order until `budget` runs out
    /// or the transport has nothing more. Returns how many were handled.
    pub fn service(&mut self, budget: Duration) -> io::Result<usize> {
        let started = now();
        let mut handled = 0;
        loop {
            let timeout = remaining(budget, elapsed_since(started));
            let Some(event) = self.transport.poll(timeout)? else {
                break;
            };
            self.handle_event(event);
            handled += 1;
        }
        Ok(handled)
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect(peer) => self.on_connect(peer),
            TransportEvent::Disconnect(peer) => self.on_disconnect(peer),
            TransportEvent::Receive {
                peer,
                channel,
                payload,
            } => self.on_receive(peer, channel, &payload),
        }
    }

    fn on_connect(&mut self, peer: PeerId) {
        let id = match self.world.connect(peer) {
            Ok(id) => id,
            Err(err) => {
                log::warn!("Refusing {peer}: {err}");
                self.transport.disconnect(peer);
                self.counters.refused += 1;
                self.push_event(ServerEvent::ConnectionRefused {
                    peer,
                    reason: err.to_string(),
                });
                return;
            }
        };

        self.peers.insert(peer, id);
        self.counters.connects += 1;
        log::info!("{peer} connected as entity {id}");

        // Large worlds arrive as several Welcomes carrying the same id.
        let snapshot = self.world.snapshot_except(id);
        let mut batches = snapshot.chunks(UPDATE_BATCH).peekable();
        if batches.peek().is_none() {
            self.send(
                peer,
                &ServerPacket::Welcome {
                    assigned_id: id,
                    entities: Vec::new(),
                },
            );
        }
        for batch in batches {
            self.send(
                peer,
                &ServerPacket::Welcome {
                    assigned_id: id,
                    entities: batch.to_vec(),
                },
            );
        }
        self.broadcast(&ServerPacket::NewEntity { id }, Some(peer));
        self.push_event(ServerEvent::PeerConnected { peer, entity: id });
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        let Some(id) = self.peers.remove(&peer) else {
            log::debug!("Disconnect from unknown {peer}");
            return;
        };
        if let Err(err) = self.world.disconnect(id) {
            log::warn!("Disconnecting {peer}: {err}");
        }
        self.counters.disconnects += 1;
        log::info!("{peer} disconnected, entity {id} freed");

        self.broadcast(&ServerPacket::DelEntity { id }, None);
        self.push_event(ServerEvent::PeerDisconnected { peer, entity: id });
    }

    fn on_receive(&mut self, peer: PeerId, channel: u8, payload: &[u8]) {
        let Some(&id) = self.peers.get(&peer) else {
            log::warn!("Packet from {peer} without an entity");
            return;
        };

        let packet = match ClientPacket::decode(channel, payload) {
            Ok(packet) => packet,
            Err(err) => {
                log::warn!("Discarding packet from {peer}: {err}");
                self.counters.protocol_errors += 1;
                self.push_event(ServerEvent::ProtocolWarning {
                    peer,
                    message: err.to_string(),
                });
                return;
            }
        };

        let result = match packet {
            ClientPacket::PositionUpdate { position } => {
                let rtt = self.transport.round_trip_time(peer);
                self.world.apply_position(id, position, rtt)
            }
            ClientPacket::JumpUpdate => self.world.apply_jump(id),
            ClientPacket::RotationUpdate { rotation } => self
                .world
                .apply_rotation(id, rotation)
                .map(|()| Validation::Accepted),
        };

        match result {
            Ok(Validation::Accepted) => {}
            Ok(Validation::Rejected(correction)) => {
                log::debug!("Correcting entity {id}: {}", correction.reason);
                self.counters.corrections += 1;
                self.send(peer, &correction.to_packet());
                self.push_event(ServerEvent::MovementRejected {
                    entity: id,
                    reason: correction.reason,
                });
            }
            Err(WorldError::UnknownEntity(id)) => {
                log::warn!("Update for unknown entity {id} from {peer}");
            }
            Err(err) => log::warn!("Update from {peer}: {err}"),
        }
    }

    fn send(&mut self, peer: PeerId, packet: &ServerPacket) {
        let result = self.transport.send(
            peer,
            packet.channel().id(),
            packet.delivery(),
            &packet.encode(),
        );
        if let Err(err) = result {
            log::warn!("Failed to send {:?} to {peer}: {err}", packet.kind());
        }
    }

    /// Sends `packet` to every peer with an entity, except `except`.
    pub fn broadcast(&mut self, packet: &ServerPacket, except: Option<PeerId>) {
        let bytes = packet.encode();
        let channel = packet.channel().id();
        let delivery = packet.delivery();

        for &peer in self.peers.keys() {
            if Some(peer) == except {
                continue;
            }
            if let Err(err) = self.transport.send(peer, channel, delivery, &bytes) {
                log::warn!("Failed to send {:?} to {peer}: {err}", packet.kind());
            }
        }
    }

    /// Disconnects every peer and frees their entities.
    pub fn shutdown_connections(&mut self) {
        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            self.transport.disconnect(peer);
            self.on_disconnect(peer);
        }
    }

    fn push_event(&mut self, event: ServerEvent) {
        if self.pending_events.len() >= EVENT_BACKLOG {
            self.pending_events.pop_front();
        }
        self.pending_events.push_back(event);
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.world.tick(),
            uptime_secs: elapsed_since(self.start_time).as_secs(),
            peer_count: self.peers.len(),
            entity_count: self.world.active_count(),
            capacity: self.world.capacity(),
            counters: self.counters,
            network_stats: self.transport.stats(),
        }
    }

    pub fn entity_infos(&self) -> Vec<EntityInfo> {
        self.world
            .players()
            .map(|record| EntityInfo {
                id: record.id,
                peer: record.peer,
                position: record.position,
                rotation: record.rotation,
                phase: record.jump.phase,
                rtt: self.transport.round_trip_time(record.peer),
            })
            .collect()
    }
}
