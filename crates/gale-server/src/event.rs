//! Action and event types for the session layer.
//!
//! - `Action`: instructions from a peer engine back to the session core
//!   (send bytes or emit an event)
//! - `ServerEvent`: occurrences surfaced to the application through the
//!   poll interface

use std::net::SocketAddr;

/// Actions that peer engines request from the session core.
#[derive(Debug)]
pub enum Action {
    /// Send the given bytes to the engine's remote endpoint
    Send(Vec<u8>),
    /// Emit an event to the application
    Emit(ServerEvent),
}

/// Events surfaced to the application.
///
/// Events carry the endpoint identity rather than a reference into the peer
/// table, so draining the queue after a removal never touches freed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A new peer was admitted.
    Connect(SocketAddr),
    /// Application data arrived from a connected peer.
    Receive {
        /// The sending peer's endpoint.
        address: SocketAddr,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },
    /// A peer left: disconnect packet, timeout, or send failure.
    Disconnect(SocketAddr),
    /// The transport failed fatally; the peer table has been cleared and
    /// the server should be stopped or restarted.
    Error,
}

impl ServerEvent {
    /// Returns the peer endpoint this event refers to, if any.
    pub fn address(&self) -> Option<SocketAddr> {
        match self {
            ServerEvent::Connect(addr) => Some(*addr),
            ServerEvent::Receive { address, .. } => Some(*address),
            ServerEvent::Disconnect(addr) => Some(*addr),
            ServerEvent::Error => None,
        }
    }
}
