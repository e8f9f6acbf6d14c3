//! High-level UDP-bound host: socket lifecycle around the session core.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket},
    sync::Arc,
    thread::{sleep, yield_now},
    time::{Duration, Instant},
};

use gale_core::{
    config::ServerConfig,
    error::Result,
    transport::DatagramSocket,
};
use gale_peer::Peer;
use gale_protocol::SendOptions;
use socket2::Socket as Socket2;

use crate::{event::ServerEvent, server::Server};

/// Abstraction over a time source to improve testability.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time instant.
    fn now(&self) -> Instant;
}

/// System clock using `Instant::now()`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Applies socket options from configuration to a UdpSocket.
fn apply_socket_options(socket: &UdpSocket, config: &ServerConfig) -> io::Result<()> {
    let socket2 = Socket2::from(socket.try_clone()?);

    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    if let Some(ttl) = config.socket_ttl {
        socket.set_ttl(ttl)?;
    }

    Ok(())
}

/// Thin [`DatagramSocket`] over a bound `UdpSocket`.
#[derive(Debug)]
struct UdpTransport {
    is_blocking_mode: bool,
    socket: UdpSocket,
}

impl UdpTransport {
    fn new(socket: UdpSocket, is_blocking_mode: bool) -> Result<Self> {
        socket.set_nonblocking(!is_blocking_mode)?;
        Ok(UdpTransport { is_blocking_mode, socket })
    }
}

impl DatagramSocket for UdpTransport {
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(length, address)| (&buffer[..length], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn is_blocking_mode(&self) -> bool {
        self.is_blocking_mode
    }
}

/// High-level server host bound to a UDP socket.
///
/// Owns the session core over a [`Peer`] engine and drives it either
/// manually ([`Host::manual_poll`]) or through the blocking
/// [`Host::start_polling`] loop.
pub struct Host {
    server: Server<UdpTransport, Peer>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("peers", &self.server.peer_count()).finish()
    }
}

impl Host {
    /// Binds a host to the specified address with default configuration.
    pub fn bind<A: ToSocketAddrs>(addresses: A) -> Result<Self> {
        Self::bind_with_config(addresses, ServerConfig::default())
    }

    /// Binds a host to any available port on localhost with default
    /// configuration.
    pub fn bind_any() -> Result<Self> {
        Self::bind_any_with_config(ServerConfig::default())
    }

    /// Binds a host to any available port on localhost with the specified
    /// configuration.
    pub fn bind_any_with_config(config: ServerConfig) -> Result<Self> {
        let loopback = Ipv4Addr::new(127, 0, 0, 1);
        let address = SocketAddrV4::new(loopback, 0);
        Self::bind_with_config(address, config)
    }

    /// Starts a host listening on the given port on all interfaces.
    pub fn start(port: u16) -> Result<Self> {
        Self::bind((Ipv4Addr::UNSPECIFIED, port))
    }

    /// Binds a host to the specified address with custom configuration.
    pub fn bind_with_config<A: ToSocketAddrs>(addresses: A, config: ServerConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addresses)?;
        Self::bind_with_config_and_clock(socket, config, Arc::new(SystemClock))
    }

    /// Binds a host with a custom socket, configuration and clock.
    pub fn bind_with_config_and_clock(
        socket: UdpSocket,
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        apply_socket_options(&socket, &config)?;
        let transport = UdpTransport::new(socket, config.blocking_mode)?;

        Ok(Host { server: Server::new(transport, config), clock })
    }

    /// Receives the next available session event, if any.
    pub fn recv(&mut self) -> Option<ServerEvent> {
        self.server.recv()
    }

    /// Queues application data for one peer. Returns false when the
    /// endpoint is not connected.
    pub fn send(&mut self, address: SocketAddr, payload: &[u8], options: SendOptions) -> bool {
        self.server.send(address, payload, options)
    }

    /// Queues application data for every connected peer and returns how
    /// many peers were addressed.
    pub fn broadcast(&mut self, payload: &[u8], options: SendOptions) -> usize {
        self.server.broadcast(payload, options)
    }

    /// Like [`Host::broadcast`] but skips `excluded`.
    pub fn broadcast_except(
        &mut self,
        payload: &[u8],
        options: SendOptions,
        excluded: SocketAddr,
    ) -> usize {
        self.server.broadcast_except(payload, options, excluded)
    }

    /// Sends a teardown notification to a peer and evicts it.
    pub fn disconnect(&mut self, address: SocketAddr) {
        self.server.disconnect_peer(address)
    }

    /// Notifies every peer and clears the peer table. The socket itself is
    /// released when the host is dropped.
    pub fn stop(&mut self) {
        self.server.shutdown()
    }

    /// Snapshot of all connected endpoints.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.server.peers()
    }

    /// Returns the peer engine tracking an endpoint, if connected.
    pub fn peer(&self, address: &SocketAddr) -> Option<&Peer> {
        self.server.peer(address)
    }

    /// Returns the number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.server.peer_count()
    }

    /// Returns the current disconnect timeout.
    pub fn disconnect_timeout(&self) -> Duration {
        self.server.disconnect_timeout()
    }

    /// Changes the round-trip estimate above which peers are evicted.
    pub fn set_disconnect_timeout(&mut self, timeout: Duration) {
        self.server.set_disconnect_timeout(timeout)
    }

    /// Manually polls the socket for inbound datagrams and advances every
    /// peer.
    pub fn manual_poll(&mut self, time: Instant) {
        self.server.manual_poll(time)
    }

    /// Starts automatic polling in a loop with 1 ms intervals (blocking
    /// call).
    pub fn start_polling(&mut self) {
        self.start_polling_with_duration(Some(Duration::from_millis(1)))
    }

    /// Starts automatic polling with a custom sleep duration between polls
    /// (blocking call).
    pub fn start_polling_with_duration(&mut self, sleep_duration: Option<Duration>) {
        loop {
            self.manual_poll(self.clock.now());
            match sleep_duration {
                None => yield_now(),
                Some(duration) => sleep(duration),
            }
        }
    }

    /// Returns the local socket address this host is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.socket().local_addr()?)
    }
}
