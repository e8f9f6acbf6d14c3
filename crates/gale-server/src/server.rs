//! The session core: dispatch, admission, housekeeping and broadcast over a
//! generic datagram socket and peer engine.

use std::{
    io,
    net::SocketAddr,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use gale_core::{buffer_pool::BufferPool, config::ServerConfig, transport::DatagramSocket};
use gale_protocol::{Envelope, PacketProperty, SendOptions};
use tracing::{debug, error, trace, warn};

use crate::{
    engine::Engine,
    event::{Action, ServerEvent},
    table::PeerTable,
};

/// Sends and events produced during a poll, staged until the end of the
/// pass and then flushed together: datagrams to the socket, events into the
/// channel, send buffers back into the pool.
struct Outbox {
    pending_sends: Vec<(SocketAddr, Vec<u8>)>,
    pending_events: Vec<ServerEvent>,
    send_pool: BufferPool,
}

impl Outbox {
    fn new(buffer_size: usize) -> Self {
        Self {
            pending_sends: Vec::new(),
            pending_events: Vec::new(),
            send_pool: BufferPool::new(buffer_size, 256),
        }
    }

    fn handle_actions(&mut self, address: &SocketAddr, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(bytes) => self.pending_sends.push((*address, bytes)),
                Action::Emit(event) => self.pending_events.push(event),
            }
        }
    }

    fn emit(&mut self, event: ServerEvent) {
        self.pending_events.push(event);
    }
}

/// Session layer over a datagram socket and a generic peer [`Engine`].
///
/// Single-threaded and tick-driven: all mutation happens inside
/// [`Server::manual_poll`], which dispatches every pending inbound datagram,
/// runs the housekeeping pass, applies staged removals and flushes outbound
/// traffic. The application drains events through [`Server::recv`].
pub struct Server<TSocket: DatagramSocket, E: Engine> {
    socket: TSocket,
    config: ServerConfig,
    disconnect_timeout: Duration,
    table: PeerTable<E>,
    outbox: Outbox,
    event_sender: Sender<ServerEvent>,
    event_receiver: Receiver<ServerEvent>,
    receive_buffer: Vec<u8>,
    last_tick: Option<Instant>,
    current_time: Instant,
}

impl<TSocket: DatagramSocket, E: Engine> Server<TSocket, E> {
    /// Creates a new server over the given socket. The capacity bound is
    /// taken from `config.max_peers` and fixed for the server's lifetime.
    pub fn new(socket: TSocket, config: ServerConfig) -> Self {
        let (event_sender, event_receiver) = unbounded();

        Server {
            receive_buffer: vec![0; config.receive_buffer_max_size],
            table: PeerTable::new(config.max_peers),
            outbox: Outbox::new(config.receive_buffer_max_size),
            disconnect_timeout: config.disconnect_timeout,
            config,
            socket,
            event_sender,
            event_receiver,
            last_tick: None,
            current_time: Instant::now(),
        }
    }

    /// Polls the socket for inbound datagrams, runs the housekeeping pass
    /// and flushes outbound traffic and events.
    pub fn manual_poll(&mut self, time: Instant) {
        self.current_time = time;
        let delta = match self.last_tick {
            Some(previous) => time.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.last_tick = Some(time);

        loop {
            match self.socket.receive_packet(self.receive_buffer.as_mut()) {
                Ok((payload, address)) => {
                    let length = payload.len();
                    self.dispatch_datagram(length, address, time);
                }
                Err(err) => {
                    if err.kind() != io::ErrorKind::WouldBlock
                        && err.kind() != io::ErrorKind::TimedOut
                    {
                        self.handle_transport_failure(err);
                    }
                    break;
                }
            }
            if self.socket.is_blocking_mode() {
                break;
            }
        }

        self.housekeeping(delta, time);
        self.flush();
    }

    /// Receives the next available event, if any. Draining is destructive
    /// and preserves production order.
    pub fn recv(&mut self) -> Option<ServerEvent> {
        match self.event_receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Returns the event receiver for draining session events.
    pub fn event_receiver(&self) -> &Receiver<ServerEvent> {
        &self.event_receiver
    }

    /// Snapshot of all connected endpoints. Order carries no meaning.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.table.addresses()
    }

    /// Returns the engine tracking an endpoint, if connected.
    pub fn peer(&self, address: &SocketAddr) -> Option<&E> {
        self.table.get(address)
    }

    /// Returns the number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.table.len()
    }

    /// Returns the capacity bound fixed at construction.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the current disconnect timeout.
    pub fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    /// Changes the round-trip estimate above which peers are evicted.
    pub fn set_disconnect_timeout(&mut self, timeout: Duration) {
        self.disconnect_timeout = timeout;
    }

    /// Returns a reference to the underlying socket.
    pub fn socket(&self) -> &TSocket {
        &self.socket
    }

    /// Returns a mutable reference to the underlying socket.
    pub fn socket_mut(&mut self) -> &mut TSocket {
        &mut self.socket
    }

    /// Queues application data for one peer; it is sent during the next
    /// poll. Returns false when the endpoint is unknown or already
    /// condemned.
    pub fn send(&mut self, address: SocketAddr, payload: &[u8], options: SendOptions) -> bool {
        if self.table.is_staged(&address) {
            return false;
        }
        let time = self.current_time;
        match self.table.get_mut(&address) {
            Some(engine) => {
                let actions = engine.send(payload, options, time);
                self.outbox.handle_actions(&address, actions);
                true
            }
            None => false,
        }
    }

    /// Queues application data for every connected peer. Returns the number
    /// of peers addressed. A failure to deliver to one peer surfaces as a
    /// disconnect for that peer and never stops the remaining sends.
    pub fn broadcast(&mut self, payload: &[u8], options: SendOptions) -> usize {
        self.broadcast_inner(payload, options, None)
    }

    /// Like [`Server::broadcast`] but skips `excluded`.
    pub fn broadcast_except(
        &mut self,
        payload: &[u8],
        options: SendOptions,
        excluded: SocketAddr,
    ) -> usize {
        self.broadcast_inner(payload, options, Some(excluded))
    }

    fn broadcast_inner(
        &mut self,
        payload: &[u8],
        options: SendOptions,
        excluded: Option<SocketAddr>,
    ) -> usize {
        let time = self.current_time;
        let mut count = 0;
        for address in self.table.addresses() {
            if Some(address) == excluded || self.table.is_staged(&address) {
                continue;
            }
            if let Some(engine) = self.table.get_mut(&address) {
                let actions = engine.send(payload, options, time);
                self.outbox.handle_actions(&address, actions);
                count += 1;
            }
        }
        count
    }

    /// Sends a teardown notification to a peer and evicts it. Idempotent:
    /// unknown or already-condemned endpoints are ignored. No disconnect
    /// event is produced; the caller initiated the teardown.
    pub fn disconnect_peer(&mut self, address: SocketAddr) {
        if !self.table.contains(&address) || self.table.is_staged(&address) {
            return;
        }
        let time = self.current_time;
        if let Some(engine) = self.table.get_mut(&address) {
            let actions = engine.disconnect_notification(time);
            self.outbox.handle_actions(&address, actions);
        }
        self.table.stage_removal(address);
        // No traversal is active here, so the removal can land at once
        self.apply_removals();
    }

    /// Notifies every peer of the shutdown (best effort) and clears the
    /// table unconditionally.
    pub fn shutdown(&mut self) {
        let time = self.current_time;
        for address in self.table.addresses() {
            if let Some(engine) = self.table.get_mut(&address) {
                let actions = engine.disconnect_notification(time);
                self.outbox.handle_actions(&address, actions);
            }
        }
        for (address, payload) in self.outbox.pending_sends.drain(..) {
            if let Err(err) = self.socket.send_packet(&address, &payload) {
                warn!("error sending shutdown notification (to {}): {}", address, err);
            }
            self.outbox.send_pool.recycle(payload);
        }
        self.table.clear();
    }

    /// Routes one inbound datagram by sender identity and packet property.
    fn dispatch_datagram(&mut self, length: usize, address: SocketAddr, time: Instant) {
        if self.table.contains(&address) {
            if self.table.is_staged(&address) {
                // Condemned this tick: no new work
                return;
            }

            // Decode through a pooled scratch buffer; malformed datagrams
            // recycle it and vanish without a trace event
            let decoded = match self.table.get_mut(&address) {
                Some(engine) => {
                    let mut scratch = engine.create_packet();
                    scratch.extend_from_slice(&self.receive_buffer[..length]);
                    let decoded = Envelope::decode(&scratch);
                    engine.recycle(scratch);
                    decoded
                }
                None => return,
            };

            match decoded {
                Err(err) => {
                    trace!("dropping malformed datagram from {}: {}", address, err);
                }
                Ok(envelope) if envelope.property() == PacketProperty::Disconnect => {
                    self.condemn(address);
                }
                Ok(envelope) => {
                    if let Some(engine) = self.table.get_mut(&address) {
                        let actions = engine.process_packet(envelope, time);
                        self.outbox.handle_actions(&address, actions);
                    }
                }
            }
        } else {
            // Unauthenticated endpoints get no observable response other
            // than a successful connect
            match Envelope::decode(&self.receive_buffer[..length]) {
                Ok(envelope) if envelope.property() == PacketProperty::Connect => {
                    if self.table.len() < self.table.capacity() {
                        self.admit(address, time);
                    } else {
                        trace!("ignoring connect request from {}: table full", address);
                    }
                }
                Ok(_) => {
                    trace!("ignoring datagram from unknown endpoint {}", address);
                }
                Err(err) => {
                    trace!("dropping malformed datagram from unknown {}: {}", address, err);
                }
            }
        }
    }

    /// Promotes an unknown endpoint to a tracked peer: seeds its liveness
    /// grace period, acknowledges the connect, and announces the admission.
    fn admit(&mut self, address: SocketAddr, time: Instant) {
        let mut engine = E::create(&self.config, address, time);
        engine.set_bad_round_trip_threshold(self.config.initial_bad_round_trip_threshold());
        let actions = engine.connect_acknowledgment(time);

        // The dispatcher checked the bound already, but the table enforces
        // it again; a failed insertion sends nothing and emits nothing
        match self.table.insert(address, engine) {
            Ok(()) => {
                debug!("accepted connect request from {}", address);
                self.outbox.handle_actions(&address, actions);
                self.outbox.emit(ServerEvent::Connect(address));
            }
            Err(err) => {
                debug!("rejected connect request from {}: {}", address, err);
            }
        }
    }

    /// Advances every peer once, evicting the unresponsive. Walks a
    /// snapshot so staged removals never disturb the traversal; removals
    /// land only after the snapshot is fully processed.
    fn housekeeping(&mut self, delta: Duration, time: Instant) {
        for address in self.table.addresses() {
            if self.table.is_staged(&address) {
                // Condemned earlier in the tick; not updated, it is being
                // torn down
                continue;
            }
            let timed_out = match self.table.get(&address) {
                Some(engine) => engine.round_trip_estimate(time) > self.disconnect_timeout,
                None => continue,
            };
            if timed_out {
                debug!("peer {} exceeded the disconnect timeout", address);
                self.condemn(address);
            } else if let Some(engine) = self.table.get_mut(&address) {
                let actions = engine.update(delta, time);
                self.outbox.handle_actions(&address, actions);
            }
        }
        self.apply_removals();
    }

    /// Flushes pending sends and events. A send failure for a known peer is
    /// handled like a timeout: disconnect event plus staged removal, while
    /// the remaining sends continue.
    fn flush(&mut self) {
        let mut failed = Vec::new();
        for (address, payload) in self.outbox.pending_sends.drain(..) {
            if let Err(err) = self.socket.send_packet(&address, &payload) {
                error!("error sending a packet (to {}): {}", address, err);
                failed.push(address);
            }
            self.outbox.send_pool.recycle(payload);
        }
        for address in failed {
            self.condemn(address);
        }
        for event in self.outbox.pending_events.drain(..) {
            self.event_sender.send(event).expect("receiver lives as long as the server");
        }
        self.apply_removals();
    }

    /// The single funnel for event-producing evictions: the inbound
    /// disconnect packet, the housekeeping timeout and the send failure all
    /// end up here. Emits exactly one disconnect event per departure.
    fn condemn(&mut self, address: SocketAddr) {
        if self.table.contains(&address) && !self.table.is_staged(&address) {
            self.table.stage_removal(address);
            self.outbox.emit(ServerEvent::Disconnect(address));
        }
    }

    fn apply_removals(&mut self) {
        for (address, _engine) in self.table.apply_staged_removals() {
            trace!("removed peer {}", address);
        }
    }

    /// Clears the table and surfaces one server-wide error event; the
    /// application is expected to stop or restart the server.
    fn handle_transport_failure(&mut self, err: io::Error) {
        error!("fatal transport error: {}", err);
        self.table.clear();
        self.outbox.emit(ServerEvent::Error);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    // ===== Test doubles =====

    struct MockSocket {
        inbound: VecDeque<(SocketAddr, Vec<u8>)>,
        sent: Vec<(SocketAddr, Vec<u8>)>,
        fail_sends_to: HashSet<SocketAddr>,
        fatal: Option<io::Error>,
    }

    impl MockSocket {
        fn new() -> Self {
            Self {
                inbound: VecDeque::new(),
                sent: Vec::new(),
                fail_sends_to: HashSet::new(),
                fatal: None,
            }
        }

        fn push_inbound(&mut self, address: SocketAddr, bytes: Vec<u8>) {
            self.inbound.push_back((address, bytes));
        }
    }

    impl DatagramSocket for MockSocket {
        fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
            if self.fail_sends_to.contains(addr) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "send failed"));
            }
            self.sent.push((*addr, payload.to_vec()));
            Ok(payload.len())
        }

        fn receive_packet<'a>(
            &mut self,
            buffer: &'a mut [u8],
        ) -> io::Result<(&'a [u8], SocketAddr)> {
            if let Some(err) = self.fatal.take() {
                return Err(err);
            }
            match self.inbound.pop_front() {
                Some((address, bytes)) => {
                    buffer[..bytes.len()].copy_from_slice(&bytes);
                    Ok((&buffer[..bytes.len()], address))
                }
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "drained")),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(addr(0))
        }

        fn is_blocking_mode(&self) -> bool {
            false
        }
    }

    #[derive(Debug)]
    struct MockEngine {
        address: SocketAddr,
        updates: usize,
        rtt: Duration,
        threshold: Duration,
    }

    impl Engine for MockEngine {
        fn create(_config: &ServerConfig, address: SocketAddr, _time: Instant) -> Self {
            Self { address, updates: 0, rtt: Duration::ZERO, threshold: Duration::ZERO }
        }

        fn address(&self) -> SocketAddr {
            self.address
        }

        fn create_packet(&mut self) -> Vec<u8> {
            Vec::new()
        }

        fn recycle(&mut self, _packet: Vec<u8>) {}

        fn process_packet(&mut self, envelope: Envelope, _time: Instant) -> Vec<Action> {
            match envelope {
                Envelope::Unreliable { payload } => vec![Action::Emit(ServerEvent::Receive {
                    address: self.address,
                    payload,
                })],
                _ => Vec::new(),
            }
        }

        fn send(&mut self, payload: &[u8], _options: SendOptions, _time: Instant) -> Vec<Action> {
            vec![Action::Send(payload.to_vec())]
        }

        fn connect_acknowledgment(&mut self, _time: Instant) -> Vec<Action> {
            vec![Action::Send(Envelope::Connect { session_id: 1 }.encode())]
        }

        fn disconnect_notification(&mut self, _time: Instant) -> Vec<Action> {
            vec![Action::Send(Envelope::Disconnect.encode())]
        }

        fn update(&mut self, _delta: Duration, _time: Instant) -> Vec<Action> {
            self.updates += 1;
            Vec::new()
        }

        fn round_trip_estimate(&self, _time: Instant) -> Duration {
            self.rtt
        }

        fn set_bad_round_trip_threshold(&mut self, threshold: Duration) {
            self.threshold = threshold;
        }
    }

    fn server_with_capacity(capacity: usize) -> Server<MockSocket, MockEngine> {
        let mut config = ServerConfig::default();
        config.max_peers = capacity;
        Server::new(MockSocket::new(), config)
    }

    fn connect_bytes() -> Vec<u8> {
        Envelope::Connect { session_id: 0 }.encode()
    }

    fn drain(server: &mut Server<MockSocket, MockEngine>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Some(event) = server.recv() {
            events.push(event);
        }
        events
    }

    // ===== Admission =====

    #[test]
    fn connect_request_admits_peer_and_emits_event() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());

        server.manual_poll(Instant::now());

        assert_eq!(server.peer_count(), 1);
        assert_eq!(drain(&mut server), vec![ServerEvent::Connect(addr(1))]);
        // The connect acknowledgment went out
        assert_eq!(server.socket().sent.len(), 1);
        assert_eq!(server.socket().sent[0].0, addr(1));
    }

    #[test]
    fn admission_seeds_bad_round_trip_threshold() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());

        server.manual_poll(Instant::now());

        let expected = server.config.initial_bad_round_trip_threshold();
        assert_eq!(server.peer(&addr(1)).unwrap().threshold, expected);
    }

    #[test]
    fn capacity_bound_rejects_excess_connects_silently() {
        let mut server = server_with_capacity(1);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.socket_mut().push_inbound(addr(2), connect_bytes());

        server.manual_poll(Instant::now());

        assert_eq!(server.peer_count(), 1);
        assert!(server.peer(&addr(1)).is_some());
        // Exactly one connect event, nothing for the rejected endpoint
        assert_eq!(drain(&mut server), vec![ServerEvent::Connect(addr(1))]);
        // Only the accepted endpoint was written to
        assert!(server.socket().sent.iter().all(|(a, _)| *a == addr(1)));
    }

    #[test]
    fn duplicate_connect_does_not_create_second_peer() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.socket_mut().push_inbound(addr(1), connect_bytes());

        server.manual_poll(Instant::now());

        assert_eq!(server.peer_count(), 1);
        assert_eq!(drain(&mut server), vec![ServerEvent::Connect(addr(1))]);
    }

    #[test]
    fn unknown_endpoint_data_is_ignored() {
        let mut server = server_with_capacity(4);
        server
            .socket_mut()
            .push_inbound(addr(1), Envelope::Unreliable { payload: vec![1, 2] }.encode());

        server.manual_poll(Instant::now());

        assert_eq!(server.peer_count(), 0);
        assert!(drain(&mut server).is_empty());
        assert!(server.socket().sent.is_empty());
    }

    // ===== Dispatch =====

    #[test]
    fn data_from_known_peer_becomes_receive_event() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);

        server
            .socket_mut()
            .push_inbound(addr(1), Envelope::Unreliable { payload: vec![7, 8, 9] }.encode());
        server.manual_poll(Instant::now());

        assert_eq!(
            drain(&mut server),
            vec![ServerEvent::Receive { address: addr(1), payload: vec![7, 8, 9] }]
        );
    }

    #[test]
    fn disconnect_packet_evicts_peer_with_one_event() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);

        server.socket_mut().push_inbound(addr(1), Envelope::Disconnect.encode());
        // A trailing datagram from the condemned peer in the same tick is
        // dropped rather than dispatched
        server
            .socket_mut()
            .push_inbound(addr(1), Envelope::Unreliable { payload: vec![1] }.encode());
        server.manual_poll(Instant::now());

        assert_eq!(drain(&mut server), vec![ServerEvent::Disconnect(addr(1))]);
        assert_eq!(server.peer_count(), 0);
    }

    #[test]
    fn malformed_datagrams_never_surface() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);

        // From a known peer and from a stranger
        server.socket_mut().push_inbound(addr(1), vec![0xFF, 0xFE]);
        server.socket_mut().push_inbound(addr(2), vec![0xFF]);
        server.socket_mut().push_inbound(addr(2), Vec::new());
        server.manual_poll(Instant::now());

        assert!(drain(&mut server).is_empty());
        assert_eq!(server.peer_count(), 1);
    }

    // ===== Housekeeping =====

    #[test]
    fn timeout_evicts_only_unresponsive_peers() {
        let mut server = server_with_capacity(8);
        for port in 1..=3 {
            server.socket_mut().push_inbound(addr(port), connect_bytes());
        }
        let start = Instant::now();
        server.manual_poll(start);
        drain(&mut server);

        // Push one peer past the default 5000 ms timeout
        server.table.get_mut(&addr(2)).unwrap().rtt = Duration::from_millis(5001);

        server.manual_poll(start + Duration::from_millis(100));

        assert_eq!(drain(&mut server), vec![ServerEvent::Disconnect(addr(2))]);
        assert_eq!(server.peer_count(), 2);
        assert!(server.peer(&addr(2)).is_none());

        // Survivors got exactly one update in the second tick, the evicted
        // peer none before removal
        assert_eq!(server.peer(&addr(1)).unwrap().updates, 2);
        assert_eq!(server.peer(&addr(3)).unwrap().updates, 2);
    }

    #[test]
    fn eviction_works_for_many_peers_in_one_tick() {
        let mut server = server_with_capacity(8);
        for port in 1..=5 {
            server.socket_mut().push_inbound(addr(port), connect_bytes());
        }
        let start = Instant::now();
        server.manual_poll(start);
        drain(&mut server);

        for port in [1, 3, 5] {
            server.table.get_mut(&addr(port)).unwrap().rtt = Duration::from_secs(6);
        }
        server.manual_poll(start + Duration::from_millis(100));

        let events = drain(&mut server);
        let evicted: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Disconnect(a) => Some(*a),
                _ => None,
            })
            .collect();
        assert_eq!(evicted.len(), 3);
        assert_eq!(server.peer_count(), 2);
        assert!(server.peer(&addr(2)).is_some());
        assert!(server.peer(&addr(4)).is_some());
    }

    #[test]
    fn raised_disconnect_timeout_spares_slow_peers() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        let start = Instant::now();
        server.manual_poll(start);
        drain(&mut server);

        server.table.get_mut(&addr(1)).unwrap().rtt = Duration::from_millis(7000);

        // The setter writes through: with a 10 s timeout the peer survives
        server.set_disconnect_timeout(Duration::from_secs(10));
        assert_eq!(server.disconnect_timeout(), Duration::from_secs(10));

        server.manual_poll(start + Duration::from_millis(100));
        assert!(drain(&mut server).is_empty());
        assert_eq!(server.peer_count(), 1);
    }

    // ===== Send failures =====

    #[test]
    fn send_failure_is_treated_like_a_timeout() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.socket_mut().push_inbound(addr(2), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);

        server.socket_mut().fail_sends_to.insert(addr(1));
        server.send(addr(1), b"one", SendOptions::Unreliable);
        server.send(addr(2), b"two", SendOptions::Unreliable);
        server.manual_poll(Instant::now());

        assert_eq!(drain(&mut server), vec![ServerEvent::Disconnect(addr(1))]);
        assert!(server.peer(&addr(1)).is_none());
        // The other send still went out
        assert!(server.socket().sent.iter().any(|(a, p)| *a == addr(2) && p == b"two"));
    }

    // ===== Broadcast =====

    #[test]
    fn broadcast_except_skips_the_excluded_peer() {
        let mut server = server_with_capacity(8);
        for port in 1..=3 {
            server.socket_mut().push_inbound(addr(port), connect_bytes());
        }
        server.manual_poll(Instant::now());
        drain(&mut server);
        server.socket_mut().sent.clear();

        let count = server.broadcast_except(b"hi", SendOptions::Unreliable, addr(2));
        server.manual_poll(Instant::now());

        assert_eq!(count, 2);
        let recipients: HashSet<_> = server
            .socket()
            .sent
            .iter()
            .filter(|(_, p)| p == b"hi")
            .map(|(a, _)| *a)
            .collect();
        assert_eq!(recipients, HashSet::from([addr(1), addr(3)]));
    }

    #[test]
    fn broadcast_reaches_every_peer() {
        let mut server = server_with_capacity(8);
        for port in 1..=3 {
            server.socket_mut().push_inbound(addr(port), connect_bytes());
        }
        server.manual_poll(Instant::now());
        drain(&mut server);

        assert_eq!(server.broadcast(b"all", SendOptions::Unreliable), 3);
    }

    // ===== Ordering =====

    #[test]
    fn events_drain_in_production_order() {
        let mut server = server_with_capacity(8);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server
            .socket_mut()
            .push_inbound(addr(1), Envelope::Unreliable { payload: vec![1] }.encode());
        server
            .socket_mut()
            .push_inbound(addr(1), Envelope::Unreliable { payload: vec![2] }.encode());
        server.socket_mut().push_inbound(addr(1), Envelope::Disconnect.encode());
        server.manual_poll(Instant::now());

        assert_eq!(
            drain(&mut server),
            vec![
                ServerEvent::Connect(addr(1)),
                ServerEvent::Receive { address: addr(1), payload: vec![1] },
                ServerEvent::Receive { address: addr(1), payload: vec![2] },
                ServerEvent::Disconnect(addr(1)),
            ]
        );
    }

    // ===== Lifecycle =====

    #[test]
    fn disconnect_peer_notifies_and_removes_without_event() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);

        server.disconnect_peer(addr(1));
        assert_eq!(server.peer_count(), 0);

        server.manual_poll(Instant::now());
        assert!(drain(&mut server).is_empty());
        // The teardown notification was queued and flushed
        assert!(server
            .socket()
            .sent
            .iter()
            .any(|(a, p)| *a == addr(1) && matches!(Envelope::decode(p), Ok(Envelope::Disconnect))));

        // Idempotent on unknown endpoints
        server.disconnect_peer(addr(1));
        server.disconnect_peer(addr(9));
    }

    #[test]
    fn shutdown_notifies_all_peers_and_clears_table() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.socket_mut().push_inbound(addr(2), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);
        server.socket_mut().sent.clear();

        server.shutdown();

        assert_eq!(server.peer_count(), 0);
        let notified: HashSet<_> = server
            .socket()
            .sent
            .iter()
            .filter(|(_, p)| matches!(Envelope::decode(p), Ok(Envelope::Disconnect)))
            .map(|(a, _)| *a)
            .collect();
        assert_eq!(notified, HashSet::from([addr(1), addr(2)]));
    }

    #[test]
    fn fatal_transport_error_clears_table_and_emits_error() {
        let mut server = server_with_capacity(4);
        server.socket_mut().push_inbound(addr(1), connect_bytes());
        server.manual_poll(Instant::now());
        drain(&mut server);

        server.socket_mut().fatal =
            Some(io::Error::new(io::ErrorKind::PermissionDenied, "socket gone"));
        server.manual_poll(Instant::now());

        assert_eq!(server.peer_count(), 0);
        assert_eq!(drain(&mut server), vec![ServerEvent::Error]);
    }
}
