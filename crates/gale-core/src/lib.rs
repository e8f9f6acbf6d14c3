#![warn(missing_docs)]

//! gale-core: foundational types shared across the gale workspace.
//!
//! This crate provides the minimal set of utilities used by every layer:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - Buffer pooling
//! - Transport abstraction for pluggable I/O

/// Protocol constants shared across layers.
pub mod constants {
    /// Size in bytes of the property tag prefixed to every datagram.
    pub const PROPERTY_HEADER_SIZE: usize = 1;
    /// Size in bytes of a ping or pong datagram (property tag + timestamp).
    pub const PING_PACKET_SIZE: usize = 5;
    /// Size in bytes of a sequenced data header (property tag + sequence).
    pub const SEQUENCED_HEADER_SIZE: usize = 3;
    /// Maximum transmission unit of the payload.
    ///
    /// Derived from ethernet_mtu - ipv6_header_size - udp_header_size
    ///       1452 = 1500         - 40               - 8
    ///
    /// This is not strictly guaranteed -- there may be less room in an
    /// ethernet frame than this due to variability in ipv6 header size.
    pub const DEFAULT_MTU: usize = 1452;
    /// This is the current protocol version.
    ///
    /// Incremental monolithic protocol number.
    pub const PROTOCOL_VERSION: u16 = 1;
}

/// Buffer pooling for scratch and send buffers.
pub mod buffer_pool;
/// Configuration options for the server and its peers.
pub mod config;
/// Error types and results.
pub mod error;
/// Transport abstraction for pluggable I/O.
pub mod transport;
