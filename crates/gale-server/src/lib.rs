#![warn(missing_docs)]

//! gale-server: the server-side session layer over a datagram socket.
//!
//! Turns one unreliable, connectionless socket into a managed,
//! connection-oriented multi-client service: connection admission with a
//! capacity bound, per-endpoint peer tracking, liveness monitoring via
//! round-trip estimates, graceful and abrupt teardown, inbound routing and
//! outbound broadcast — surfaced to the application as a poll-style event
//! stream.

/// The capability interface the session layer consumes from a peer engine.
pub mod engine;
/// Action and event types.
pub mod event;
/// High-level UDP-bound host wrapping the server.
pub mod host;
/// The session core: dispatch, admission, housekeeping, broadcast.
pub mod server;
/// The peer table and its stage/apply removal protocol.
pub mod table;

mod peer_engine;

pub use engine::Engine;
pub use event::{Action, ServerEvent};
pub use host::{Clock, Host, SystemClock};
pub use server::Server;
pub use table::PeerTable;
