//! The peer engine: state for one connected remote endpoint.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use gale_core::{buffer_pool::BufferPool, config::ServerConfig};
use gale_protocol::{sequence_greater_than, Envelope, SendOptions};

use crate::statistics::PeerStatistics;

/// One unanswered round-trip probe.
///
/// `first_sent_at` anchors liveness aging across re-probes: if a ping goes
/// unanswered we probe again with a fresh timestamp, but the age of the
/// oldest unanswered probe keeps growing until a pong arrives.
#[derive(Debug, Clone, Copy)]
struct PingProbe {
    first_sent_at: Instant,
    timestamp: u32,
    sent_at: Instant,
}

/// Represents a remote peer tracked by the server.
///
/// Tracks network quality via ping/pong round trips, stamps outgoing
/// sequenced data, and pools packet buffers for reuse.
pub struct Peer {
    /// Last time we received a datagram from this endpoint
    pub last_heard: Instant,
    /// Last time we sent a datagram to this endpoint
    pub last_sent: Instant,
    /// The address of the remote endpoint
    pub remote_address: SocketAddr,

    /// Epoch for the millisecond timestamps carried by pings
    created: Instant,
    /// Random session identifier echoed in the connect acknowledgment
    session_id: u16,

    /// Smoothed round-trip time; None until the first pong arrives
    smoothed_rtt: Option<Duration>,
    /// Unanswered-probe age beyond which the round-trip estimate starts
    /// tracking unresponsiveness instead of the smoothed value
    bad_round_trip_threshold: Duration,
    /// Accumulates elapsed time between ping emissions
    ping_timer: Duration,
    /// The currently outstanding probe, if any
    outstanding_ping: Option<PingProbe>,

    /// Sequence stamped onto the next outgoing sequenced datagram
    outgoing_sequence: u16,
    /// Latest sequence accepted from the remote end
    remote_sequence: Option<u16>,

    statistics: PeerStatistics,
    pool: BufferPool,

    update_interval: Duration,
    rtt_smoothing_factor: f32,
}

impl Peer {
    /// Creates a new peer for the provided endpoint.
    pub fn new(address: SocketAddr, config: &ServerConfig, time: Instant) -> Peer {
        use rand::Rng;
        let mut rng = rand::rng();

        Peer {
            last_heard: time,
            last_sent: time,
            remote_address: address,
            created: time,
            session_id: rng.random(),
            smoothed_rtt: None,
            bad_round_trip_threshold: config.initial_bad_round_trip_threshold(),
            ping_timer: Duration::ZERO,
            outstanding_ping: None,
            outgoing_sequence: 0,
            remote_sequence: None,
            statistics: PeerStatistics::default(),
            pool: BufferPool::new(config.receive_buffer_max_size, 32),
            update_interval: config.update_interval,
            rtt_smoothing_factor: config.rtt_smoothing_factor,
        }
    }

    /// Takes a reusable buffer from this peer's pool.
    pub fn create_packet(&mut self) -> Vec<u8> {
        self.pool.allocate()
    }

    /// Returns a buffer to this peer's pool.
    pub fn recycle(&mut self, packet: Vec<u8>) {
        self.pool.recycle(packet);
    }

    /// Returns the session identifier assigned at creation.
    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// Returns the peer's transfer statistics.
    pub fn statistics(&self) -> &PeerStatistics {
        &self.statistics
    }

    /// Current liveness measure for this peer.
    ///
    /// Returns the smoothed round trip while the peer answers probes. Once a
    /// probe has gone unanswered longer than the bad-round-trip threshold,
    /// the estimate tracks the age of the oldest unanswered probe, so an
    /// unresponsive peer's estimate keeps climbing until it crosses the
    /// disconnect timeout.
    pub fn round_trip_estimate(&self, time: Instant) -> Duration {
        let base = self.smoothed_rtt.unwrap_or(Duration::ZERO);
        match self.outstanding_ping {
            Some(probe) => {
                let age = time.saturating_duration_since(probe.first_sent_at);
                if age > self.bad_round_trip_threshold {
                    base.max(age)
                } else {
                    base
                }
            }
            None => base,
        }
    }

    /// Sets the unanswered-probe grace period.
    pub fn set_bad_round_trip_threshold(&mut self, threshold: Duration) {
        self.bad_round_trip_threshold = threshold;
    }

    /// Returns the unanswered-probe grace period.
    pub fn bad_round_trip_threshold(&self) -> Duration {
        self.bad_round_trip_threshold
    }

    /// Marks an inbound datagram of `bytes` wire bytes from this endpoint.
    pub fn touch(&mut self, bytes: usize, time: Instant) {
        self.last_heard = time;
        self.statistics.record_received(bytes);
    }

    /// Encodes the connect acknowledgment for this peer.
    pub fn acknowledge_connect(&mut self, time: Instant) -> Vec<u8> {
        self.encode(&Envelope::Connect { session_id: self.session_id }, time)
    }

    /// Encodes the graceful-teardown notification for this peer.
    pub fn disconnect_notification(&mut self, time: Instant) -> Vec<u8> {
        self.encode(&Envelope::Disconnect, time)
    }

    /// Encodes an outbound data datagram, stamping a sequence number when
    /// the options ask for sequenced delivery.
    pub fn encode_data(&mut self, payload: &[u8], options: SendOptions, time: Instant) -> Vec<u8> {
        let envelope = match options {
            SendOptions::Unreliable => Envelope::Unreliable { payload: payload.to_vec() },
            SendOptions::Sequenced => {
                self.outgoing_sequence = self.outgoing_sequence.wrapping_add(1);
                Envelope::Sequenced { sequence: self.outgoing_sequence, payload: payload.to_vec() }
            }
        };
        self.encode(&envelope, time)
    }

    /// Answers an inbound ping by echoing its timestamp.
    pub fn handle_ping(&mut self, timestamp: u32, time: Instant) -> Vec<u8> {
        self.encode(&Envelope::Pong { timestamp }, time)
    }

    /// Folds an inbound pong into the smoothed round-trip estimate.
    ///
    /// Any pong clears the outstanding probe: the remote is answering, so
    /// liveness aging stops even when the pong belongs to an earlier
    /// re-probe whose send time we no longer hold. Only a pong matching the
    /// latest probe's timestamp contributes an RTT sample.
    pub fn handle_pong(&mut self, timestamp: u32, time: Instant) {
        let Some(probe) = self.outstanding_ping.take() else {
            return;
        };
        if probe.timestamp != timestamp {
            return;
        }

        let sample = time.saturating_duration_since(probe.sent_at);
        let smoothed = match self.smoothed_rtt {
            None => sample,
            Some(current) => {
                let current_s = current.as_secs_f32();
                let next = current_s + (sample.as_secs_f32() - current_s) * self.rtt_smoothing_factor;
                Duration::from_secs_f32(next.max(0.0))
            }
        };
        self.smoothed_rtt = Some(smoothed);
    }

    /// Decides whether a sequenced datagram is fresh. Stale datagrams
    /// (at or behind the latest accepted sequence) must be dropped.
    pub fn accept_sequenced(&mut self, sequence: u16) -> bool {
        match self.remote_sequence {
            Some(latest) if !sequence_greater_than(sequence, latest) => false,
            _ => {
                self.remote_sequence = Some(sequence);
                true
            }
        }
    }

    /// Advances this peer's timers by `delta`. Emits a ping datagram every
    /// update interval: a fresh probe when none is outstanding, a re-probe
    /// (keeping the original aging anchor) when one is.
    pub fn update(&mut self, delta: Duration, time: Instant) -> Option<Vec<u8>> {
        self.ping_timer += delta;
        if self.ping_timer < self.update_interval {
            return None;
        }
        self.ping_timer = Duration::ZERO;

        let timestamp = self.timestamp_millis(time);
        self.outstanding_ping = Some(match self.outstanding_ping {
            Some(probe) => PingProbe { first_sent_at: probe.first_sent_at, timestamp, sent_at: time },
            None => PingProbe { first_sent_at: time, timestamp, sent_at: time },
        });
        Some(self.encode(&Envelope::Ping { timestamp }, time))
    }

    /// Milliseconds since this peer was created, wrapping at u32 range.
    fn timestamp_millis(&self, time: Instant) -> u32 {
        time.saturating_duration_since(self.created).as_millis() as u32
    }

    fn encode(&mut self, envelope: &Envelope, time: Instant) -> Vec<u8> {
        let mut buffer = self.pool.allocate();
        // Writing into a Vec cannot fail
        envelope.encode_into(&mut buffer).expect("vec write");
        self.last_sent = time;
        self.statistics.record_sent(buffer.len());
        buffer
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("remote_address", &self.remote_address)
            .field("session_id", &self.session_id)
            .field("smoothed_rtt", &self.smoothed_rtt)
            .field("outstanding_ping", &self.outstanding_ping.is_some())
            .finish()
    }
}
