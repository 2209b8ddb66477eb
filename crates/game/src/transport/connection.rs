use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::tracking::{AckTracker, ReceiveTracker, RttEstimator, sequence_greater_than};
use super::{ChannelId, PeerId};

/// Unanswered pings remembered per peer; older ones are forgotten.
const MAX_OUTSTANDING_PINGS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingReliable {
    pub reliable_sequence: u32,
    pub channel: ChannelId,
    pub payload: Vec<u8>,
    /// Every datagram this payload travelled in. An ack for any of them
    /// settles it.
    pub datagrams: Vec<u32>,
    pub sent_at: Instant,
}

#[derive(Debug)]
pub(crate) struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub state: PeerState,
    pub client_salt: u64,
    pub send_sequence: u32,
    pub acks: AckTracker,
    pub received: ReceiveTracker,
    pub rtt: RttEstimator,
    next_reliable: u32,
    pub outbox: VecDeque<PendingReliable>,
    next_expected: u32,
    inbox: BTreeMap<u32, (ChannelId, Vec<u8>)>,
    last_unreliable: HashMap<ChannelId, u32>,
    pub ack_due: bool,
    pub last_receive: Instant,
    pub last_send: Instant,
    pub last_ping: Instant,
    outstanding_pings: VecDeque<u64>,
}

impl Peer {
    fn new(id: PeerId, addr: SocketAddr, state: PeerState, client_salt: u64, now: Instant) -> Self {
        Self {
            id,
            addr,
            state,
            client_salt,
            // Sequence 0 is what an empty receive tracker acknowledges.
            send_sequence: 1,
            acks: AckTracker::new(256),
            received: ReceiveTracker::new(),
            rtt: RttEstimator::default(),
            next_reliable: 0,
            outbox: VecDeque::new(),
            next_expected: 0,
            inbox: BTreeMap::new(),
            last_unreliable: HashMap::new(),
            ack_due: false,
            last_receive: now,
            last_send: now,
            last_ping: now,
            outstanding_pings: VecDeque::new(),
        }
    }

    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    pub fn next_reliable_sequence(&mut self) -> u32 {
        let sequence = self.next_reliable;
        self.next_reliable = self.next_reliable.wrapping_add(1);
        sequence
    }

    /// Settles outbox entries whose datagrams the remote acknowledged.
    pub fn acknowledge(&mut self, ack: u32, ack_bitfield: u32) {
        let acked = self.acks.process_ack(ack, ack_bitfield);
        if acked.is_empty() {
            return;
        }
        self.outbox
            .retain(|pending| !pending.datagrams.iter().any(|seq| acked.contains(seq)));
    }

    /// Buffers a reliable payload and returns every payload that is now
    /// deliverable in order. Duplicates yield nothing.
    pub fn accept_reliable(
        &mut self,
        sequence: u32,
        channel: ChannelId,
        payload: Vec<u8>,
    ) -> Vec<(ChannelId, Vec<u8>)> {
        if sequence_greater_than(self.next_expected, sequence) {
            return Vec::new();
        }
        self.inbox.entry(sequence).or_insert((channel, payload));

        let mut ready = Vec::new();
        while let Some(entry) = self.inbox.remove(&self.next_expected) {
            ready.push(entry);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
        ready
    }

    /// Accepts an unreliable payload only if its datagram is newer than the
    /// last one delivered on the same channel.
    pub fn accept_unreliable(&mut self, datagram_sequence: u32, channel: ChannelId) -> bool {
        match self.last_unreliable.get(&channel) {
            Some(&last) if !sequence_greater_than(datagram_sequence, last) => false,
            _ => {
                self.last_unreliable.insert(channel, datagram_sequence);
                true
            }
        }
    }

    pub fn due_resends(&self, now: Instant, interval: Duration) -> Vec<usize> {
        self.outbox
            .iter()
            .enumerate()
            .filter(|(_, pending)| now.saturating_duration_since(pending.sent_at) >= interval)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn ping_sent(&mut self, timestamp_us: u64) {
        if self.outstanding_pings.len() == MAX_OUTSTANDING_PINGS {
            self.outstanding_pings.pop_front();
        }
        self.outstanding_pings.push_back(timestamp_us);
    }

    /// True if `timestamp_us` echoes a ping we sent and have not seen
    /// answered. That ping and every older one are settled.
    pub fn pong_received(&mut self, timestamp_us: u64) -> bool {
        let Some(index) = self
            .outstanding_pings
            .iter()
            .position(|&sent| sent == timestamp_us)
        else {
            return false;
        };
        self.outstanding_pings.drain(..=index);
        true
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_receive) > timeout
    }
}

#[derive(Debug)]
pub(crate) struct PeerTable {
    by_addr: HashMap<SocketAddr, PeerId>,
    peers: HashMap<PeerId, Peer>,
    next_id: u32,
    max_peers: usize,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self {
            by_addr: HashMap::new(),
            peers: HashMap::new(),
            next_id: 1,
            max_peers,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers
    }

    pub fn find(&self, addr: &SocketAddr) -> Option<PeerId> {
        self.by_addr.get(addr).copied()
    }

    pub fn addr(&self, id: PeerId) -> Option<SocketAddr> {
        self.peers.get(&id).map(|peer| peer.addr)
    }

    pub fn state(&self, id: PeerId) -> Option<PeerState> {
        self.peers.get(&id).map(|peer| peer.state)
    }

    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.peers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn insert(
        &mut self,
        addr: SocketAddr,
        state: PeerState,
        client_salt: u64,
        now: Instant,
    ) -> Option<PeerId> {
        if self.is_full() {
            return None;
        }
        let id = PeerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        self.peers
            .insert(id, Peer::new(id, addr, state, client_salt, now));
        self.by_addr.insert(addr, id);
        Some(id)
    }

    pub(crate) fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn peer() -> Peer {
        Peer::new(PeerId(1), addr(9000), PeerState::Connected, 0, Instant::now())
    }

    #[test]
    fn reliable_payloads_are_released_in_order() {
        let mut peer = peer();

        assert!(peer.accept_reliable(1, 0, vec![1]).is_empty());
        assert!(peer.accept_reliable(2, 0, vec![2]).is_empty());

        let ready = peer.accept_reliable(0, 0, vec![0]);
        let payloads: Vec<_> = ready.into_iter().map(|(_, p)| p[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2]);
    }

    #[test]
    fn only_echoes_of_sent_pings_count() {
        let mut peer = peer();
        assert!(!peer.pong_received(0));

        peer.ping_sent(100);
        peer.ping_sent(200);
        assert!(!peer.pong_received(150));
        assert!(peer.pong_received(200));
        // Answering the newer ping settles the older one too.
        assert!(!peer.pong_received(100));
        assert!(!peer.pong_received(200));
    }

    #[test]
    fn outstanding_pings_are_bounded() {
        let mut peer = peer();
        for ts in 0..(MAX_OUTSTANDING_PINGS as u64 + 2) {
            peer.ping_sent(ts);
        }
        assert!(!peer.pong_received(0));
        assert!(peer.pong_received(2));
    }

    #[test]
    fn reliable_duplicates_are_dropped() {
        let mut peer = peer();
        assert_eq!(peer.accept_reliable(0, 0, vec![9]).len(), 1);
        assert!(peer.accept_reliable(0, 0, vec![9]).is_empty());
    }

    #[test]
    fn stale_unreliable_is_dropped_per_channel() {
        let mut peer = peer();
        assert!(peer.accept_unreliable(10, 1));
        assert!(!peer.accept_unreliable(9, 1));
        assert!(!peer.accept_unreliable(10, 1));
        assert!(peer.accept_unreliable(9, 2));
        assert!(peer.accept_unreliable(11, 1));
    }

    #[test]
    fn ack_settles_resent_payload() {
        let mut peer = peer();
        peer.acks.track(5);
        peer.acks.track(8);
        peer.outbox.push_back(PendingReliable {
            reliable_sequence: 0,
            channel: 0,
            payload: vec![1],
            datagrams: vec![5, 8],
            sent_at: Instant::now(),
        });

        peer.acknowledge(5, 0);
        assert!(peer.outbox.is_empty());
    }

    #[test]
    fn table_respects_capacity_and_addresses() {
        let now = Instant::now();
        let mut table = PeerTable::new(1);

        let first = table
            .insert(addr(1), PeerState::Connected, 7, now)
            .unwrap();
        assert!(table.insert(addr(2), PeerState::Connected, 8, now).is_none());
        assert_eq!(table.find(&addr(1)), Some(first));

        table.remove(first);
        assert!(table.find(&addr(1)).is_none());
        assert!(table.is_empty());
    }
}
