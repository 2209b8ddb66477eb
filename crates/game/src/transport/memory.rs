use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use super::stats::NetworkStats;
use super::{ChannelId, Delivery, PeerId, Transport, TransportEvent, not_connected};

#[derive(Debug, Default)]
struct HubState {
    next_id: u32,
    inboxes: HashMap<PeerId, VecDeque<TransportEvent>>,
    links: HashSet<(PeerId, PeerId)>,
    round_trip: HashMap<PeerId, Duration>,
    drop_unreliable: bool,
}

fn link(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl HubState {
    fn deliver(&mut self, to: PeerId, event: TransportEvent) {
        if let Some(inbox) = self.inboxes.get_mut(&to) {
            inbox.push_back(event);
        }
    }
}

/// In-process switchboard connecting [`MemoryTransport`] endpoints. Every
/// endpoint's id is also the peer handle others use to address it.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> MemoryTransport {
        let mut state = self.state.borrow_mut();
        let id = PeerId(state.next_id);
        state.next_id += 1;
        state.inboxes.insert(id, VecDeque::new());

        MemoryTransport {
            id,
            hub: self.clone(),
            stats: NetworkStats::default(),
        }
    }

    /// Links two endpoints and queues a `Connect` event on both sides.
    pub fn connect(&self, a: PeerId, b: PeerId) {
        let mut state = self.state.borrow_mut();
        if state.links.insert(link(a, b)) {
            state.deliver(a, TransportEvent::Connect(b));
            state.deliver(b, TransportEvent::Connect(a));
        }
    }

    /// Round-trip time every endpoint reports for `peer`.
    pub fn set_round_trip_time(&self, peer: PeerId, rtt: Duration) {
        self.state.borrow_mut().round_trip.insert(peer, rtt);
    }

    /// Silently discards unreliable sends while set.
    pub fn set_drop_unreliable(&self, drop: bool) {
        self.state.borrow_mut().drop_unreliable = drop;
    }

    pub fn pending(&self, endpoint: PeerId) -> usize {
        self.state
            .borrow()
            .inboxes
            .get(&endpoint)
            .map_or(0, VecDeque::len)
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: PeerId,
    hub: MemoryHub,
    stats: NetworkStats,
}

impl MemoryTransport {
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl Transport for MemoryTransport {
    /// Never blocks: nothing can arrive while this thread waits.
    fn poll(&mut self, _timeout: Duration) -> io::Result<Option<TransportEvent>> {
        let event = self
            .hub
            .state
            .borrow_mut()
            .inboxes
            .get_mut(&self.id)
            .and_then(VecDeque::pop_front);

        if let Some(TransportEvent::Receive { payload, .. }) = &event {
            self.stats.record_received(payload.len());
        }
        Ok(event)
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: ChannelId,
        delivery: Delivery,
        payload: &[u8],
    ) -> io::Result<()> {
        let mut state = self.hub.state.borrow_mut();
        if !state.links.contains(&link(self.id, peer)) {
            return Err(not_connected(peer));
        }

        self.stats.record_sent(payload.len());
        if delivery == Delivery::Unreliable && state.drop_unreliable {
            return Ok(());
        }

        state.deliver(
            peer,
            TransportEvent::Receive {
                peer: self.id,
                channel,
                payload: payload.to_vec(),
            },
        );
        Ok(())
    }

    fn round_trip_time(&self, peer: PeerId) -> Duration {
        self.hub
            .state
            .borrow()
            .round_trip
            .get(&peer)
            .copied()
            .unwrap_or_default()
    }

    fn disconnect(&mut self, peer: PeerId) {
        let mut state = self.hub.state.borrow_mut();
        if state.links.remove(&link(self.id, peer)) {
            state.deliver(peer, TransportEvent::Disconnect(self.id));
        }
    }

    fn stats(&self) -> NetworkStats {
        self.stats.clone()
    }
}
