//! Error types and results for the gale workspace.

use std::{
    fmt::{self, Display, Formatter},
    io,
};

/// Convenience alias over [`ErrorKind`].
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Errors that can occur in the session layer and its collaborators.
#[derive(Debug)]
pub enum ErrorKind {
    /// Wrapper around a std io error.
    IOError(io::Error),
    /// The peer table is at its capacity bound, or the endpoint is already
    /// tracked.
    CapacityExceeded,
    /// A datagram could not be decoded into an envelope.
    DecodingError(DecodingErrorKind),
}

/// Reasons envelope decoding can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingErrorKind {
    /// The datagram did not carry a recognized property tag.
    PacketProperty,
    /// The datagram ended before the header it announced.
    Truncated,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::IOError(e) => write!(f, "An IO error occurred: {}", e),
            ErrorKind::CapacityExceeded => {
                write!(f, "The peer table is full or the endpoint is already tracked")
            }
            ErrorKind::DecodingError(e) => write!(f, "Unable to decode datagram: {}", e),
        }
    }
}

impl Display for DecodingErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DecodingErrorKind::PacketProperty => write!(f, "unrecognized packet property"),
            DecodingErrorKind::Truncated => write!(f, "datagram shorter than its header"),
        }
    }
}

impl std::error::Error for ErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ErrorKind::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(inner: io::Error) -> Self {
        ErrorKind::IOError(inner)
    }
}
