use std::{default::Default, time::Duration};

use crate::constants::DEFAULT_MTU;

#[derive(Clone, Debug)]
/// Configuration options to tune server and peer behavior.
///
/// `max_peers` is fixed for the lifetime of a server; the disconnect
/// timeout can be changed at runtime through the server surface.
pub struct ServerConfig {
    /// Make the underlying UDP socket block when true, otherwise non-blocking.
    pub blocking_mode: bool,
    /// Maximum number of tracked peers. Connect requests arriving while the
    /// peer table is full are ignored without a reply.
    pub max_peers: usize,
    /// Round-trip estimate above which a peer is considered gone.
    pub disconnect_timeout: Duration,
    /// Cadence of per-peer upkeep: ping emission and timer advancement.
    pub update_interval: Duration,
    /// Fixed margin added on top of `2 * update_interval` when seeding the
    /// bad-round-trip threshold of a newly admitted peer.
    pub bad_round_trip_margin: Duration,
    /// Smoothing factor (0..1) for RTT measurements.
    pub rtt_smoothing_factor: f32,
    /// Max receive buffer size in bytes.
    pub receive_buffer_max_size: usize,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing packets (None = use system default).
    /// Corresponds to IP_TTL socket option.
    pub socket_ttl: Option<u32>,
}

impl ServerConfig {
    /// Threshold seeded into newly admitted peers: two update intervals plus
    /// a fixed margin of grace before liveness tracking may flag them as
    /// unresponsive.
    pub fn initial_bad_round_trip_threshold(&self) -> Duration {
        self.update_interval * 2 + self.bad_round_trip_margin
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            blocking_mode: false,
            max_peers: 32,
            disconnect_timeout: Duration::from_millis(5000),
            update_interval: Duration::from_millis(100),
            bad_round_trip_margin: Duration::from_millis(250),
            rtt_smoothing_factor: 0.10,
            receive_buffer_max_size: DEFAULT_MTU,
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
            socket_ttl: None,              // Use system default
        }
    }
}
