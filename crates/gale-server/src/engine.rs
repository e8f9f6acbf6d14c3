//! The capability interface the session layer consumes from a peer engine.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use gale_core::config::ServerConfig;
use gale_protocol::{Envelope, SendOptions};

use crate::event::Action;

/// Per-endpoint engine driven by the session core.
///
/// The session layer depends only on this surface; whatever bookkeeping an
/// implementation keeps for delivery (sequencing, probes, statistics) is
/// opaque to it. One concrete implementation is provided for
/// `gale_peer::Peer`.
pub trait Engine {
    /// Creates and initializes an engine bound to a newly admitted endpoint.
    fn create(config: &ServerConfig, address: SocketAddr, time: Instant) -> Self
    where
        Self: Sized;

    /// The remote endpoint this engine is bound to.
    fn address(&self) -> SocketAddr;

    /// Takes a reusable scratch buffer from the engine's pool.
    fn create_packet(&mut self) -> Vec<u8>;

    /// Returns a buffer to the engine's pool.
    fn recycle(&mut self, packet: Vec<u8>);

    /// Processes one decoded inbound envelope.
    fn process_packet(&mut self, envelope: Envelope, time: Instant) -> Vec<Action>;

    /// Encodes outbound application data for this peer.
    fn send(&mut self, payload: &[u8], options: SendOptions, time: Instant) -> Vec<Action>;

    /// Encodes the connect acknowledgment for this peer.
    fn connect_acknowledgment(&mut self, time: Instant) -> Vec<Action>;

    /// Encodes the graceful-teardown notification for this peer.
    fn disconnect_notification(&mut self, time: Instant) -> Vec<Action>;

    /// Advances the engine's timers by `delta`; may emit keepalive probes.
    fn update(&mut self, delta: Duration, time: Instant) -> Vec<Action>;

    /// Current liveness measure for this peer.
    fn round_trip_estimate(&self, time: Instant) -> Duration;

    /// Sets the unanswered-probe grace period.
    fn set_bad_round_trip_threshold(&mut self, threshold: Duration);
}
