//! Peer transfer statistics tracking.

/// Wire-level transfer counters for one peer.
#[derive(Debug, Clone, Default)]
pub struct PeerStatistics {
    /// Total datagrams sent to this peer
    pub packets_sent: u64,
    /// Total datagrams received from this peer
    pub packets_received: u64,
    /// Total bytes sent to this peer
    pub bytes_sent: u64,
    /// Total bytes received from this peer
    pub bytes_received: u64,
}

impl PeerStatistics {
    /// Records one outgoing datagram of the given size.
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Records one incoming datagram of the given size.
    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Resets all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_initialized_to_zero() {
        let stats = PeerStatistics::default();
        assert_eq!(stats.packets_sent, 0);
        assert_eq!(stats.packets_received, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.bytes_received, 0);
    }

    #[test]
    fn test_statistics_accumulate() {
        let mut stats = PeerStatistics::default();
        stats.record_sent(10);
        stats.record_sent(5);
        stats.record_received(3);

        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.bytes_sent, 15);
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.bytes_received, 3);
    }

    #[test]
    fn test_statistics_reset() {
        let mut stats = PeerStatistics::default();
        stats.record_sent(100);
        stats.record_received(50);

        stats.reset();

        assert_eq!(stats.packets_sent, 0);
        assert_eq!(stats.bytes_received, 0);
    }
}
