use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::connection::{Peer, PeerState, PeerTable, PendingReliable};
use super::envelope::{Datagram, DatagramHeader, Frame, MAX_DATAGRAM_SIZE};
use super::stats::{NetworkStats, rand_u64};
use super::{ChannelId, Delivery, PeerId, Transport, TransportEvent, not_connected};
use crate::time;

const POLL_SLEEP: Duration = Duration::from_millis(1);
const DISCONNECT_REPEATS: usize = 3;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Silence after which a peer is dropped.
    pub timeout: Duration,
    pub ping_interval: Duration,
    pub connect_retry: Duration,
    /// Lower bound on the reliable resend interval.
    pub min_resend: Duration,
    pub max_peers: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            ping_interval: Duration::from_millis(250),
            connect_retry: Duration::from_millis(500),
            min_resend: Duration::from_millis(100),
            max_peers: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Server,
    Client,
}

/// Connection-oriented transport over a single non-blocking UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    role: Role,
    config: UdpConfig,
    peers: PeerTable,
    events: VecDeque<TransportEvent>,
    stats: NetworkStats,
    epoch: Instant,
    recv_buffer: [u8; MAX_DATAGRAM_SIZE],
}

impl UdpTransport {
    /// Listens for incoming connections.
    pub fn bind<A: ToSocketAddrs>(addr: A, config: UdpConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Self::open(socket, Role::Server, config)
    }

    /// Starts a handshake with `server`. The returned peer handle reports a
    /// `Connect` event once the server accepts.
    pub fn connect<A: ToSocketAddrs>(server: A, config: UdpConfig) -> io::Result<(Self, PeerId)> {
        let server = server.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "server address did not resolve")
        })?;
        let unspecified = match server.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))?;
        let mut transport = Self::open(socket, Role::Client, config)?;

        let now = time::now();
        let client_salt = rand_u64();
        let peer_id = transport
            .peers
            .insert(server, PeerState::Connecting, client_salt, now)
            .ok_or_else(|| io::Error::other("peer table has no capacity"))?;

        if let Some(peer) = transport.peers.get_mut(peer_id) {
            transmit(
                &transport.socket,
                &mut transport.stats,
                peer,
                Frame::Connect { client_salt },
                now,
            )?;
        }
        log::info!("Connecting to {server}");

        Ok((transport, peer_id))
    }

    fn open(socket: UdpSocket, role: Role, config: UdpConfig) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            role,
            peers: PeerTable::new(config.max_peers),
            config,
            events: VecDeque::new(),
            stats: NetworkStats::default(),
            epoch: time::now(),
            recv_buffer: [0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.addr(peer)
    }

    pub fn peer_state(&self, peer: PeerId) -> Option<PeerState> {
        self.peers.state(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.ids()
    }

    fn receive_all(&mut self) -> io::Result<()> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.record_received(size);
                    match Datagram::deserialize(&self.recv_buffer[..size]) {
                        Ok(datagram) if datagram.header.is_valid() => {
                            self.handle_datagram(addr, datagram, time::now());
                        }
                        Ok(_) | Err(_) => {
                            self.stats.dropped_invalid += 1;
                            log::debug!("Discarding invalid datagram from {addr}");
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_datagram(&mut self, addr: SocketAddr, datagram: Datagram, now: Instant) {
        let Datagram { header, frame } = datagram;

        let Some(peer_id) = self.peers.find(&addr) else {
            if let Frame::Connect { client_salt } = frame {
                self.accept(addr, client_salt, now);
            }
            return;
        };

        let socket = &self.socket;
        let stats = &mut self.stats;
        let Some(peer) = self.peers.get_mut(peer_id) else {
            return;
        };

        peer.last_receive = now;
        if !peer.received.record_received(header.sequence) {
            stats.dropped_stale += 1;
            return;
        }
        peer.acknowledge(header.ack, header.ack_bitfield);

        let reply = match frame {
            Frame::Connect { client_salt } if self.role == Role::Server => {
                // Our accept got lost; the client retries with the same salt.
                (client_salt == peer.client_salt).then_some(Frame::Accept { client_salt })
            }
            Frame::Accept { client_salt } => {
                if peer.state == PeerState::Connecting && client_salt == peer.client_salt {
                    peer.state = PeerState::Connected;
                    log::info!("Connected to {}", peer.addr);
                    self.events.push_back(TransportEvent::Connect(peer_id));
                }
                None
            }
            Frame::Deny { reason } => {
                log::warn!("Connection to {addr} denied: {reason}");
                self.drop_peer(peer_id);
                return;
            }
            Frame::Disconnect => {
                log::info!("{peer_id} disconnected");
                self.drop_peer(peer_id);
                return;
            }
            Frame::Ping { timestamp_us } => Some(Frame::Pong { timestamp_us }),
            Frame::Pong { timestamp_us } => {
                if peer.pong_received(timestamp_us) {
                    let sent_at = self.epoch + Duration::from_micros(timestamp_us);
                    peer.rtt.record_since(sent_at, now);
                } else {
                    log::debug!("Ignoring unsolicited pong from {peer_id}");
                    stats.dropped_invalid += 1;
                }
                None
            }
            Frame::Message {
                channel,
                reliable_sequence,
                payload,
            } => {
                if peer.state == PeerState::Connecting {
                    // The server only sends messages after accepting, so a
                    // lost accept is implied by the first message.
                    peer.state = PeerState::Connected;
                    self.events.push_back(TransportEvent::Connect(peer_id));
                }
                match reliable_sequence {
                    Some(sequence) => {
                        peer.ack_due = true;
                        for (channel, payload) in peer.accept_reliable(sequence, channel, payload) {
                            self.events.push_back(TransportEvent::Receive {
                                peer: peer_id,
                                channel,
                                payload,
                            });
                        }
                    }
                    None if peer.accept_unreliable(header.sequence, channel) => {
                        self.events.push_back(TransportEvent::Receive {
                            peer: peer_id,
                            channel,
                            payload,
                        });
                    }
                    None => stats.dropped_stale += 1,
                }
                None
            }
            Frame::Connect { .. } | Frame::Ack => None,
        };

        if let Some(reply) = reply {
            if let Err(err) = transmit(socket, stats, peer, reply, now) {
                log::warn!("Failed to reply to {peer_id}: {err}");
            }
        }
    }

    fn accept(&mut self, addr: SocketAddr, client_salt: u64, now: Instant) {
        if self.role != Role::Server {
            return;
        }

        let Some(peer_id) = self
            .peers
            .insert(addr, PeerState::Connected, client_salt, now)
        else {
            log::warn!("Refusing {addr}: peer table full");
            let deny = Datagram::new(
                DatagramHeader::new(0, 0, 0),
                Frame::Deny {
                    reason: "server full".to_string(),
                },
            );
            if let Ok(bytes) = deny.serialize() {
                let _ = self.socket.send_to(&bytes, addr);
            }
            return;
        };

        if let Some(peer) = self.peers.get_mut(peer_id) {
            if let Err(err) = transmit(
                &self.socket,
                &mut self.stats,
                peer,
                Frame::Accept { client_salt },
                now,
            ) {
                log::warn!("Failed to accept {addr}: {err}");
            }
        }
        log::info!("Accepted {addr} as {peer_id}");
        self.events.push_back(TransportEvent::Connect(peer_id));
    }

    fn drop_peer(&mut self, peer_id: PeerId) {
        if self.peers.remove(peer_id).is_some() {
            self.events.push_back(TransportEvent::Disconnect(peer_id));
        }
    }

    /// Timeouts, handshake retries, reliable resends, acks and pings.
    fn maintain(&mut self, now: Instant) {
        let socket = &self.socket;
        let stats = &mut self.stats;
        let config = &self.config;
        let epoch = self.epoch;
        let mut expired = Vec::new();

        for peer in self.peers.iter_mut() {
            if peer.is_timed_out(now, config.timeout) {
                expired.push(peer.id);
                continue;
            }

            let result = match peer.state {
                PeerState::Connecting => {
                    if now.saturating_duration_since(peer.last_send) >= config.connect_retry {
                        let client_salt = peer.client_salt;
                        transmit(socket, stats, peer, Frame::Connect { client_salt }, now)
                            .map(drop)
                    } else {
                        Ok(())
                    }
                }
                PeerState::Connected => service_peer(socket, stats, config, epoch, peer, now),
            };

            if let Err(err) = result {
                log::warn!("Send to {} failed: {err}", peer.id);
            }
        }

        for peer_id in expired {
            log::info!("{peer_id} timed out");
            self.drop_peer(peer_id);
        }
    }
}

fn service_peer(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    config: &UdpConfig,
    epoch: Instant,
    peer: &mut Peer,
    now: Instant,
) -> io::Result<()> {
    let resend_interval = config.min_resend.max(peer.rtt.round_trip_time() * 2);

    for index in peer.due_resends(now, resend_interval) {
        let Some(pending) = peer.outbox.get(index) else {
            continue;
        };
        let frame = Frame::Message {
            channel: pending.channel,
            reliable_sequence: Some(pending.reliable_sequence),
            payload: pending.payload.clone(),
        };
        let sequence = transmit(socket, stats, peer, frame, now)?;
        stats.resends += 1;
        if let Some(pending) = peer.outbox.get_mut(index) {
            pending.datagrams.push(sequence);
            pending.sent_at = now;
        }
    }

    if peer.ack_due {
        transmit(socket, stats, peer, Frame::Ack, now)?;
    }

    if now.saturating_duration_since(peer.last_ping) >= config.ping_interval {
        let timestamp_us = now.saturating_duration_since(epoch).as_micros() as u64;
        transmit(socket, stats, peer, Frame::Ping { timestamp_us }, now)?;
        peer.ping_sent(timestamp_us);
        peer.last_ping = now;
    }

    Ok(())
}

/// Wraps `frame` in a header for `peer` and sends it. Returns the datagram
/// sequence used.
fn transmit(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    peer: &mut Peer,
    frame: Frame,
    now: Instant,
) -> io::Result<u32> {
    let sequence = peer.next_sequence();
    let (ack, ack_bitfield) = peer.received.ack_data();
    let bytes = Datagram::new(DatagramHeader::new(sequence, ack, ack_bitfield), frame)
        .serialize()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    socket.send_to(&bytes, peer.addr)?;

    peer.acks.track(sequence);
    peer.last_send = now;
    peer.ack_due = false;
    stats.record_sent(bytes.len());
    Ok(sequence)
}

impl Transport for UdpTransport {
    fn poll(&mut self, timeout: Duration) -> io::Result<Option<TransportEvent>> {
        let deadline = time::now() + timeout;

        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            self.receive_all()?;
            self.maintain(time::now());

            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            let now = time::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep((deadline - now).min(POLL_SLEEP));
        }
    }

    fn send(
        &mut self,
        peer_id: PeerId,
        channel: ChannelId,
        delivery: Delivery,
        payload: &[u8],
    ) -> io::Result<()> {
        let now = time::now();
        let peer = self
            .peers
            .get_mut(peer_id)
            .filter(|peer| peer.state == PeerState::Connected)
            .ok_or_else(|| not_connected(peer_id))?;

        let reliable_sequence = match delivery {
            Delivery::Reliable => Some(peer.next_reliable_sequence()),
            Delivery::Unreliable => None,
        };
        let frame = Frame::Message {
            channel,
            reliable_sequence,
            payload: payload.to_vec(),
        };
        let sequence = transmit(&self.socket, &mut self.stats, peer, frame, now)?;

        if let Some(reliable_sequence) = reliable_sequence {
            peer.outbox.push_back(PendingReliable {
                reliable_sequence,
                channel,
                payload: payload.to_vec(),
                datagrams: vec![sequence],
                sent_at: now,
            });
        }
        Ok(())
    }

    fn round_trip_time(&self, peer: PeerId) -> Duration {
        self.peers
            .get(peer)
            .map(|peer| peer.rtt.round_trip_time())
            .unwrap_or_default()
    }

    fn disconnect(&mut self, peer_id: PeerId) {
        let Some(mut peer) = self.peers.remove(peer_id) else {
            return;
        };
        let now = time::now();
        for _ in 0..DISCONNECT_REPEATS {
            if let Err(err) = transmit(&self.socket, &mut self.stats, &mut peer, Frame::Disconnect, now)
            {
                log::debug!("Disconnect notice to {peer_id} failed: {err}");
                break;
            }
        }
        log::info!("Disconnected {peer_id}");
    }

    fn stats(&self) -> NetworkStats {
        let mut stats = self.stats.clone();
        let measured: Vec<_> = self
            .peers
            .iter()
            .filter(|peer| peer.rtt.has_samples())
            .collect();
        if !measured.is_empty() {
            let count = measured.len() as f32;
            stats.rtt_ms = measured.iter().map(|peer| peer.rtt.srtt()).sum::<f32>() / count;
            stats.rtt_variance = measured.iter().map(|peer| peer.rtt.rtt_var()).sum::<f32>() / count;
        }
        stats
    }
}
