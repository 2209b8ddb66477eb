use std::collections::VecDeque;
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Tracks outgoing datagram sequences until the remote acknowledges them.
#[derive(Debug)]
pub struct AckTracker {
    pending: VecDeque<u32>,
    max_pending: usize,
}

impl AckTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn track(&mut self, sequence: u32) {
        while self.pending.len() >= self.max_pending {
            self.pending.pop_front();
        }
        self.pending.push_back(sequence);
    }

    /// Removes every pending sequence covered by `ack` and its bitfield and
    /// returns them.
    pub fn process_ack(&mut self, ack: u32, ack_bitfield: u32) -> Vec<u32> {
        let mut acked = Vec::new();
        self.pending.retain(|&sequence| {
            let covered = if sequence == ack {
                true
            } else if sequence_greater_than(ack, sequence) {
                let diff = ack.wrapping_sub(sequence);
                diff <= 32 && (ack_bitfield & (1 << (diff - 1))) != 0
            } else {
                false
            };
            if covered {
                acked.push(sequence);
            }
            !covered
        });
        acked
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.len()
    }
}

/// Records incoming datagram sequences for duplicate detection and for the
/// acknowledgement fields of outgoing headers.
#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: u32,
    received_bitfield: u32,
    recent_sequences: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            last_received: 0,
            received_bitfield: 0,
            recent_sequences: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    /// Returns false for a sequence seen recently.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        if self.recent_sequences.contains(&sequence) {
            return false;
        }

        if self.recent_sequences.len() >= self.max_recent {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(sequence);

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            if diff <= 32 {
                self.received_bitfield =
                    self.received_bitfield.checked_shl(diff).unwrap_or(0) | (1 << (diff - 1));
            } else {
                self.received_bitfield = 0;
            }
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= 32 {
                self.received_bitfield |= 1 << (diff - 1);
            }
        }

        true
    }

    pub fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bitfield)
    }
}

/// Smoothed round-trip estimate in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RttEstimator {
    srtt: f32,
    rtt_var: f32,
    samples: u32,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            srtt: 0.0,
            rtt_var: 0.0,
            samples: 0,
        }
    }
}

impl RttEstimator {
    pub fn record_sample(&mut self, rtt_ms: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        if self.samples == 0 {
            self.srtt = rtt_ms;
            self.rtt_var = rtt_ms / 2.0;
        } else {
            let diff = (rtt_ms - self.srtt).abs();
            self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
            self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt_ms;
        }
        self.samples = self.samples.saturating_add(1);
    }

    pub fn record_since(&mut self, sent_at: Instant, now: Instant) {
        let rtt = now.saturating_duration_since(sent_at).as_secs_f32() * 1000.0;
        self.record_sample(rtt);
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn has_samples(&self) -> bool {
        self.samples > 0
    }

    pub fn round_trip_time(&self) -> Duration {
        Duration::from_secs_f32(self.srtt.max(0.0) / 1000.0)
    }
}
