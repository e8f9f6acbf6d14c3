//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr};

/// Low-level datagram socket abstraction.
///
/// This trait allows various transports (UDP, in-memory test fakes, etc.) to
/// be plugged into the session layer without coupling to a concrete
/// implementation. The implementor owns the socket and its receive buffer
/// reuse; the session layer only sees whole datagrams and their endpoints.
pub trait DatagramSocket {
    /// Sends a single datagram to the given endpoint.
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives a single datagram, returning the filled slice of `buffer`
    /// and the sender endpoint.
    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr)>;

    /// Returns the local address this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Returns whether the socket operates in blocking or non-blocking mode.
    fn is_blocking_mode(&self) -> bool;
}
