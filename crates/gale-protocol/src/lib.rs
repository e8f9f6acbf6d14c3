#![warn(missing_docs)]

//! gale-protocol: typed datagram envelopes and their wire codec.
//!
//! Every datagram on the wire is an [`Envelope`]: a one-byte property tag
//! followed by a property-specific header and an opaque payload. The session
//! layer only inspects the property; payload semantics belong to the
//! application.

/// Envelope types and the wire codec.
pub mod envelope;
/// Wrapping sequence-number comparison.
pub mod sequence;

pub use envelope::{Envelope, PacketProperty, SendOptions};
pub use sequence::{sequence_greater_than, sequence_less_than};
