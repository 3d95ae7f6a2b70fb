//! Error types for the sender pipeline.

use std::fmt;

use crate::address::Protocol;

/// Errors that can occur while building or driving a sender endpoint.
///
/// Variants map to specific failure modes across the pipeline:
///
/// - **Construction**: [`NoMem`](Self::NoMem),
///   [`UnsupportedProtocol`](Self::UnsupportedProtocol).
/// - **Outbound**: [`Io`](Self::Io), [`PacketTooLarge`](Self::PacketTooLarge),
///   [`BadLayout`](Self::BadLayout).
/// - **Inbound**: [`Parse`](Self::Parse), [`SessionGone`](Self::SessionGone),
///   [`Aborted`](Self::Aborted).
///
/// Use [`is_fatal`](Self::is_fatal) to tell a packet that can be skipped
/// from a condition that must stop the caller driving the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Underlying socket error reported by a transport writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The arena refused an allocation.
    #[error("arena exhausted while allocating {what}")]
    NoMem { what: &'static str },

    /// No composer chain can be built for this protocol.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(Protocol),

    /// The endpoint failed construction and cannot carry packets.
    #[error("endpoint is not valid")]
    InvalidEndpoint,

    /// Framed packet would exceed the configured maximum size.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// Packet buffer or metadata does not match the composer's layout.
    #[error("bad packet layout: {0}")]
    BadLayout(&'static str),

    /// A stage needed a metadata section the packet does not carry.
    #[error("packet has no {0} metadata")]
    MissingMetadata(&'static str),

    /// Failed to parse an inbound packet.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The session that owns the endpoint has been dropped.
    #[error("sender session is gone")]
    SessionGone,

    /// The session reported an unrecoverable condition.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl SendError {
    /// Whether the caller must stop driving the endpoint.
    ///
    /// Parse and metadata errors concern a single packet and are skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Parse { .. } | Self::MissingMetadata(_))
    }
}

/// Specific kind of inbound parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Buffer was empty.
    Empty,
    /// Buffer length is not a multiple of 32 bits.
    Misaligned,
    /// A header carried a version other than 2.
    BadVersion,
    /// Compound packet did not start with SR or RR.
    BadFirstPacket,
    /// Padding bit set on a sub-packet other than the last.
    BadPadding,
    /// Sub-packet lengths do not add up to the buffer length.
    BadLength,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty packet"),
            Self::Misaligned => write!(f, "length not 32-bit aligned"),
            Self::BadVersion => write!(f, "bad version"),
            Self::BadFirstPacket => write!(f, "compound packet must start with SR or RR"),
            Self::BadPadding => write!(f, "padding before last packet"),
            Self::BadLength => write!(f, "length mismatch"),
        }
    }
}

impl From<ParseErrorKind> for SendError {
    fn from(kind: ParseErrorKind) -> Self {
        SendError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, SendError>`.
pub type Result<T> = std::result::Result<T, SendError>;
