#![warn(missing_docs)]

//! Gale: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports the most
//! commonly used types for running a datagram server:
//!
//! - Host and events (`Host`, `ServerEvent`)
//! - Delivery options (`SendOptions`)
//! - Core configuration (`ServerConfig`)
//!
//! Example
//! ```no_run
//! use std::time::Instant;
//!
//! use gale::{Host, SendOptions, ServerEvent};
//!
//! let mut host = Host::bind("127.0.0.1:9000").unwrap();
//!
//! 'run: loop {
//!     host.manual_poll(Instant::now());
//!     while let Some(event) = host.recv() {
//!         match event {
//!             ServerEvent::Connect(addr) => println!("{} joined", addr),
//!             ServerEvent::Receive { address, payload } => {
//!                 // Echo back to everyone else
//!                 host.broadcast_except(&payload, SendOptions::Unreliable, address);
//!             }
//!             ServerEvent::Disconnect(addr) => println!("{} left", addr),
//!             ServerEvent::Error => break 'run,
//!         }
//!     }
//! }
//! ```

// Core config
pub use gale_core::config::ServerConfig;
pub use gale_core::error::{ErrorKind, Result};
// Peer engine: per-endpoint state and statistics
pub use gale_peer::{Peer, PeerStatistics};
// Protocol: envelopes and delivery options
pub use gale_protocol::{Envelope, PacketProperty, SendOptions};
// Server: session layer, host and events
pub use gale_server::{Engine, Host, Server, ServerEvent};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Envelope, ErrorKind, Host, PacketProperty, SendOptions, Server, ServerConfig, ServerEvent,
    };
}
