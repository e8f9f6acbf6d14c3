#![warn(missing_docs)]

//! gale-peer: the per-remote-endpoint engine.
//!
//! A [`Peer`] owns everything the session layer tracks about one connected
//! endpoint: ping/pong round-trip estimation, liveness accounting, outgoing
//! sequence stamping, a reusable packet-buffer pool, and transfer
//! statistics. The reliability protocol proper (acknowledgment,
//! retransmission, fragmentation) is deliberately not part of this crate.

/// The peer engine.
pub mod peer;
/// Peer transfer statistics.
pub mod statistics;

pub use peer::Peer;
pub use statistics::PeerStatistics;
