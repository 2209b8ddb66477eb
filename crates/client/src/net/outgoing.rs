use std::time::{Duration, Instant};

use glam::Vec3;
use hopper::ClientPacket;

use crate::player::PlayerEvent;

/// Allows one send per interval. The first send is always allowed.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_send: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_send: None,
        }
    }

    /// Records a send at `now` if the interval has been exceeded.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let allowed = match self.last_send {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if allowed {
            self.last_send = Some(now);
        }
        allowed
    }

    pub fn reset(&mut self) {
        self.last_send = None;
    }
}

/// Turns local player events into packets, holding everything back until
/// the server has welcomed us. The newest rate-limited position and
/// rotation are kept so [`OutgoingChannel::flush`] can deliver them once
/// the player stops.
#[derive(Debug, Clone)]
pub struct OutgoingChannel {
    position: RateLimiter,
    rotation: RateLimiter,
    pending_position: Option<Vec3>,
    pending_rotation: Option<f32>,
    enabled: bool,
}

impl OutgoingChannel {
    pub fn new(rate_limit: Duration) -> Self {
        Self {
            position: RateLimiter::new(rate_limit),
            rotation: RateLimiter::new(rate_limit),
            pending_position: None,
            pending_rotation: None,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            self.position.reset();
            self.rotation.reset();
            self.clear_pending();
        }
        self.enabled = enabled;
    }

    pub fn clear_pending(&mut self) {
        self.pending_position = None;
        self.pending_rotation = None;
    }

    pub fn packet_for(&mut self, event: &PlayerEvent, now: Instant) -> Option<ClientPacket> {
        if !self.enabled {
            return None;
        }
        match *event {
            PlayerEvent::Moved { position } => {
                if self.position.try_acquire(now) {
                    self.pending_position = None;
                    Some(ClientPacket::PositionUpdate { position })
                } else {
                    self.pending_position = Some(position);
                    None
                }
            }
            PlayerEvent::Rotated { rotation } => {
                if self.rotation.try_acquire(now) {
                    self.pending_rotation = None;
                    Some(ClientPacket::RotationUpdate { rotation })
                } else {
                    self.pending_rotation = Some(rotation);
                    None
                }
            }
            PlayerEvent::Jumped => Some(ClientPacket::JumpUpdate),
        }
    }

    /// Releases held-back updates whose limiter allows a send at `now`.
    pub fn flush(&mut self, now: Instant) -> Vec<ClientPacket> {
        let mut packets = Vec::new();
        if !self.enabled {
            return packets;
        }
        if let Some(position) = self.pending_position
            && self.position.try_acquire(now)
        {
            self.pending_position = None;
            packets.push(ClientPacket::PositionUpdate { position });
        }
        if let Some(rotation) = self.pending_rotation
            && self.rotation.try_acquire(now)
        {
            self.pending_rotation = None;
            packets.push(ClientPacket::RotationUpdate { rotation });
        }
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopper::SEND_RATE_LIMIT;

    fn moved(x: f32) -> PlayerEvent {
        PlayerEvent::Moved {
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    fn enabled() -> OutgoingChannel {
        let mut channel = OutgoingChannel::new(SEND_RATE_LIMIT);
        channel.set_enabled(true);
        channel
    }

    #[test]
    fn limiter_allows_first_then_waits_past_interval() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(Duration::from_millis(50));

        assert!(limiter.try_acquire(start));
        assert!(!limiter.try_acquire(start + Duration::from_millis(20)));
        assert!(!limiter.try_acquire(start + Duration::from_millis(50)));
        assert!(limiter.try_acquire(start + Duration::from_millis(51)));
    }

    #[test]
    fn nothing_leaves_before_welcome() {
        let mut channel = OutgoingChannel::new(SEND_RATE_LIMIT);
        let now = Instant::now();
        assert_eq!(channel.packet_for(&moved(1.0), now), None);
        assert_eq!(channel.packet_for(&PlayerEvent::Jumped, now), None);
    }

    #[test]
    fn position_and_rotation_limit_independently() {
        let mut channel = enabled();
        let now = Instant::now();

        assert!(channel.packet_for(&moved(1.0), now).is_some());
        assert_eq!(channel.packet_for(&moved(2.0), now), None);
        assert_eq!(
            channel.packet_for(&PlayerEvent::Rotated { rotation: 0.3 }, now),
            Some(ClientPacket::RotationUpdate { rotation: 0.3 })
        );
    }

    #[test]
    fn jump_is_never_limited() {
        let mut channel = enabled();
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(
                channel.packet_for(&PlayerEvent::Jumped, now),
                Some(ClientPacket::JumpUpdate)
            );
        }
    }

    #[test]
    fn last_suppressed_position_is_flushed_once() {
        let mut channel = enabled();
        let start = Instant::now();
        assert!(channel.packet_for(&moved(1.0), start).is_some());
        assert_eq!(
            channel.packet_for(&moved(2.0), start + Duration::from_millis(10)),
            None
        );

        assert!(channel.flush(start + Duration::from_millis(20)).is_empty());
        assert_eq!(
            channel.flush(start + Duration::from_millis(60)),
            vec![ClientPacket::PositionUpdate {
                position: Vec3::new(2.0, 0.0, 0.0)
            }]
        );
        assert!(channel.flush(start + Duration::from_millis(200)).is_empty());
    }

    #[test]
    fn disabling_drops_pending_updates() {
        let mut channel = enabled();
        let start = Instant::now();
        channel.packet_for(&PlayerEvent::Rotated { rotation: 0.1 }, start);
        channel.packet_for(&PlayerEvent::Rotated { rotation: 0.2 }, start);

        channel.set_enabled(false);
        channel.set_enabled(true);
        assert!(channel.flush(start + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn suppressed_update_is_superseded() {
        let mut channel = enabled();
        let start = Instant::now();
        channel.packet_for(&moved(1.0), start);
        channel.packet_for(&moved(2.0), start + Duration::from_millis(10));

        let later = channel.packet_for(&moved(3.0), start + Duration::from_millis(60));
        assert_eq!(
            later,
            Some(ClientPacket::PositionUpdate {
                position: Vec3::new(3.0, 0.0, 0.0)
            })
        );
    }
}
