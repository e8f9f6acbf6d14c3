//! Envelope types and the wire codec.

use std::{
    convert::TryFrom,
    io::{self, Cursor, Read},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use gale_core::error::{DecodingErrorKind, ErrorKind, Result};

/// Id to identify the kind of a datagram on the wire.
#[derive(Copy, Clone, Debug, PartialOrd, PartialEq, Eq)]
pub enum PacketProperty {
    /// Connection request from a client, or the server's acknowledgment
    Connect = 0,
    /// Graceful teardown notification
    Disconnect = 1,
    /// Round-trip probe carrying a millisecond timestamp
    Ping = 2,
    /// Reply to a ping, echoing its timestamp
    Pong = 3,
    /// Application data without ordering guarantees
    Unreliable = 4,
    /// Application data stamped with a sequence number; stale datagrams are
    /// dropped on receipt
    Sequenced = 5,
}

impl PacketProperty {
    /// Converts the property to its wire tag.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketProperty {
    type Error = ErrorKind;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketProperty::Connect),
            1 => Ok(PacketProperty::Disconnect),
            2 => Ok(PacketProperty::Ping),
            3 => Ok(PacketProperty::Pong),
            4 => Ok(PacketProperty::Unreliable),
            5 => Ok(PacketProperty::Sequenced),
            _ => Err(ErrorKind::DecodingError(DecodingErrorKind::PacketProperty)),
        }
    }
}

/// Delivery options for outbound application data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SendOptions {
    /// Deliver whenever the datagram arrives; reordering is possible.
    #[default]
    Unreliable,
    /// Stamp with a sequence number so receivers drop datagrams older than
    /// the latest one seen.
    Sequenced,
}

/// A decoded datagram: property tag plus property-specific contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Connection request / acknowledgment carrying the peer session id.
    Connect {
        /// Session identifier echoed back in the acknowledgment.
        session_id: u16,
    },
    /// Graceful teardown notification.
    Disconnect,
    /// Round-trip probe.
    Ping {
        /// Sender-relative milliseconds, echoed by the pong.
        timestamp: u32,
    },
    /// Reply to a ping.
    Pong {
        /// The timestamp of the ping being answered.
        timestamp: u32,
    },
    /// Application data without ordering guarantees.
    Unreliable {
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },
    /// Sequence-stamped application data.
    Sequenced {
        /// Wrapping sequence number assigned by the sender.
        sequence: u16,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },
}

impl Envelope {
    /// Returns the property tag of this envelope.
    pub fn property(&self) -> PacketProperty {
        match self {
            Envelope::Connect { .. } => PacketProperty::Connect,
            Envelope::Disconnect => PacketProperty::Disconnect,
            Envelope::Ping { .. } => PacketProperty::Ping,
            Envelope::Pong { .. } => PacketProperty::Pong,
            Envelope::Unreliable { .. } => PacketProperty::Unreliable,
            Envelope::Sequenced { .. } => PacketProperty::Sequenced,
        }
    }

    /// Decodes a raw datagram into an envelope.
    ///
    /// Failures are recoverable: the caller is expected to drop the datagram
    /// silently (noise and corruption are normal on an unreliable transport).
    pub fn decode(raw: &[u8]) -> Result<Envelope> {
        let mut cursor = Cursor::new(raw);
        let tag = cursor.read_u8().map_err(truncated)?;
        let property = PacketProperty::try_from(tag)?;

        let envelope = match property {
            PacketProperty::Connect => Envelope::Connect {
                session_id: cursor.read_u16::<BigEndian>().map_err(truncated)?,
            },
            PacketProperty::Disconnect => Envelope::Disconnect,
            PacketProperty::Ping => Envelope::Ping {
                timestamp: cursor.read_u32::<BigEndian>().map_err(truncated)?,
            },
            PacketProperty::Pong => Envelope::Pong {
                timestamp: cursor.read_u32::<BigEndian>().map_err(truncated)?,
            },
            PacketProperty::Unreliable => Envelope::Unreliable { payload: remaining(&mut cursor) },
            PacketProperty::Sequenced => {
                let sequence = cursor.read_u16::<BigEndian>().map_err(truncated)?;
                Envelope::Sequenced { sequence, payload: remaining(&mut cursor) }
            }
        };
        Ok(envelope)
    }

    /// Encodes the envelope into the provided buffer (appends bytes).
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> io::Result<()> {
        buffer.write_u8(self.property().to_u8())?;
        match self {
            Envelope::Connect { session_id } => {
                buffer.write_u16::<BigEndian>(*session_id)?;
            }
            Envelope::Disconnect => {}
            Envelope::Ping { timestamp } | Envelope::Pong { timestamp } => {
                buffer.write_u32::<BigEndian>(*timestamp)?;
            }
            Envelope::Unreliable { payload } => {
                buffer.extend_from_slice(payload);
            }
            Envelope::Sequenced { sequence, payload } => {
                buffer.write_u16::<BigEndian>(*sequence)?;
                buffer.extend_from_slice(payload);
            }
        }
        Ok(())
    }

    /// Encodes the envelope into a freshly allocated buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(gale_core::constants::PING_PACKET_SIZE);
        // Writing into a Vec cannot fail
        self.encode_into(&mut buffer).expect("vec write");
        buffer
    }
}

fn truncated(_: io::Error) -> ErrorKind {
    ErrorKind::DecodingError(DecodingErrorKind::Truncated)
}

fn remaining(cursor: &mut Cursor<&[u8]>) -> Vec<u8> {
    let mut payload = Vec::new();
    // Reading a cursor to its end cannot fail
    cursor.read_to_end(&mut payload).expect("cursor read");
    payload
}
