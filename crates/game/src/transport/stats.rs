#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub resends: u64,
    pub dropped_stale: u64,
    pub dropped_invalid: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }
}

/// Cheap non-cryptographic random value for connection salts.
pub fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default(),
    );
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut stats = NetworkStats::default();
        stats.record_sent(100);
        stats.record_sent(20);
        stats.record_received(7);

        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.bytes_sent, 120);
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.bytes_received, 7);
    }

    #[test]
    fn salts_differ() {
        assert_ne!(rand_u64(), rand_u64());
    }
}
