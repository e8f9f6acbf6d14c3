//! Binds the concrete `gale_peer::Peer` to the session layer's [`Engine`]
//! interface.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use gale_core::config::ServerConfig;
use gale_peer::Peer;
use gale_protocol::{Envelope, SendOptions};
use tracing::trace;

use crate::{
    engine::Engine,
    event::{Action, ServerEvent},
};

impl Engine for Peer {
    fn create(config: &ServerConfig, address: SocketAddr, time: Instant) -> Peer {
        Peer::new(address, config, time)
    }

    fn address(&self) -> SocketAddr {
        self.remote_address
    }

    fn create_packet(&mut self) -> Vec<u8> {
        Peer::create_packet(self)
    }

    fn recycle(&mut self, packet: Vec<u8>) {
        Peer::recycle(self, packet)
    }

    fn process_packet(&mut self, envelope: Envelope, time: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        match envelope {
            Envelope::Connect { .. } => {
                // Our acknowledgment was lost or delayed; answer again
                self.touch(0, time);
                actions.push(Action::Send(self.acknowledge_connect(time)));
            }
            Envelope::Disconnect => {
                // Teardown is decided by the dispatcher before the engine
                // ever sees the datagram; nothing to do here
                self.touch(0, time);
            }
            Envelope::Ping { timestamp } => {
                self.touch(0, time);
                actions.push(Action::Send(self.handle_ping(timestamp, time)));
            }
            Envelope::Pong { timestamp } => {
                self.touch(0, time);
                self.handle_pong(timestamp, time);
            }
            Envelope::Unreliable { payload } => {
                self.touch(payload.len(), time);
                actions.push(Action::Emit(ServerEvent::Receive {
                    address: self.remote_address,
                    payload,
                }));
            }
            Envelope::Sequenced { sequence, payload } => {
                self.touch(payload.len(), time);
                if self.accept_sequenced(sequence) {
                    actions.push(Action::Emit(ServerEvent::Receive {
                        address: self.remote_address,
                        payload,
                    }));
                } else {
                    trace!("dropping stale sequenced datagram from {}", self.remote_address);
                }
            }
        }
        actions
    }

    fn send(&mut self, payload: &[u8], options: SendOptions, time: Instant) -> Vec<Action> {
        vec![Action::Send(self.encode_data(payload, options, time))]
    }

    fn connect_acknowledgment(&mut self, time: Instant) -> Vec<Action> {
        vec![Action::Send(self.acknowledge_connect(time))]
    }

    fn disconnect_notification(&mut self, time: Instant) -> Vec<Action> {
        vec![Action::Send(Peer::disconnect_notification(self, time))]
    }

    fn update(&mut self, delta: Duration, time: Instant) -> Vec<Action> {
        match Peer::update(self, delta, time) {
            Some(ping) => vec![Action::Send(ping)],
            None => Vec::new(),
        }
    }

    fn round_trip_estimate(&self, time: Instant) -> Duration {
        Peer::round_trip_estimate(self, time)
    }

    fn set_bad_round_trip_threshold(&mut self, threshold: Duration) {
        Peer::set_bad_round_trip_threshold(self, threshold)
    }
}
