//! Packet model and pipeline stage traits.
//!
//! A [`Packet`] is a byte buffer plus optional metadata sections, one per
//! protocol layer that touched it. Stages of the pipeline are connected
//! through three narrow traits:
//!
//! - [`PacketWriter`]: push a packet downstream (transport, shipper, queue).
//! - [`Composer`]: lay out and serialize protocol framing.
//! - [`Parser`]: decode protocol framing of an inbound packet.
//!
//! Packets travel as [`PacketPtr`] (`Arc<Packet>`). A stage that needs to
//! modify a packet goes through [`Arc::make_mut`], which mutates in place
//! when the stage holds the only reference.

pub mod shipper;

use std::net::SocketAddr;
use std::ops::Range;
use std::sync::Arc;

use crate::address::FecScheme;
use crate::error::{Result, SendError};

pub use shipper::Shipper;

/// Shared packet handle passed between stages.
pub type PacketPtr = Arc<Packet>;

/// Packet has UDP addressing.
pub const FLAG_UDP: u32 = 1 << 0;
/// Packet has RTP framing.
pub const FLAG_RTP: u32 = 1 << 1;
/// Packet has an FEC payload ID.
pub const FLAG_FEC: u32 = 1 << 2;
/// Packet carries a repair symbol.
pub const FLAG_REPAIR: u32 = 1 << 3;
/// Packet carries RTCP.
pub const FLAG_RTCP: u32 = 1 << 4;
/// Buffer was allocated and laid out by a composer.
pub const FLAG_PREPARED: u32 = 1 << 5;
/// Framing has been serialized into the buffer.
pub const FLAG_COMPOSED: u32 = 1 << 6;
/// Framing has been decoded from the buffer.
pub const FLAG_PARSED: u32 = 1 << 7;

/// UDP addressing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpMeta {
    pub src_addr: Option<SocketAddr>,
    pub dst_addr: Option<SocketAddr>,
}

/// RTP fixed header fields and layout (RFC 3550 §5.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpMeta {
    pub payload_type: u8,
    pub seqnum: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub marker: bool,
    /// Number of trailing payload bytes that are RTP padding.
    pub padding: usize,
    pub header: Range<usize>,
    pub payload: Range<usize>,
}

/// FEC payload ID fields and layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FecMeta {
    pub scheme: FecScheme,
    pub source_block_number: u32,
    pub encoding_symbol_id: u32,
    pub source_block_length: u32,
    pub block_length: u32,
    pub payload_id: Range<usize>,
    pub payload: Range<usize>,
}

impl FecMeta {
    pub fn new(scheme: FecScheme) -> Self {
        Self {
            scheme,
            source_block_number: 0,
            encoding_symbol_id: 0,
            source_block_length: 0,
            block_length: 0,
            payload_id: 0..0,
            payload: 0..0,
        }
    }
}

/// One sub-packet of an RTCP compound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpBlock {
    pub packet_type: u8,
    /// Report/source count from the header's 5-bit count field.
    pub count: u8,
    pub range: Range<usize>,
}

/// RTCP layout, and the sub-packets found when parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcpMeta {
    pub payload: Range<usize>,
    pub blocks: Vec<RtcpBlock>,
}

/// A network packet.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    flags: u32,
    buffer: Vec<u8>,
    /// Innermost payload region, set by the composer or parser.
    payload: Range<usize>,
    pub udp: Option<UdpMeta>,
    pub rtp: Option<RtpMeta>,
    pub fec: Option<FecMeta>,
    pub rtcp: Option<RtcpMeta>,
}

impl Packet {
    /// Empty outbound packet, to be prepared by a composer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound packet holding raw bytes received from the network.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let buffer = data.into();
        let payload = 0..buffer.len();
        Self {
            buffer,
            payload,
            ..Self::default()
        }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether all bits of `flags` are set.
    pub fn has_flags(&self, flags: u32) -> bool {
        self.flags & flags == flags
    }

    pub fn add_flags(&mut self, flags: u32) {
        self.flags |= flags;
    }

    /// Whole packet as it goes on the wire.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Innermost payload (media, repair symbol, or RTCP body).
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload.clone()]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.payload.clone()]
    }

    pub(crate) fn set_payload(&mut self, range: Range<usize>) {
        self.payload = range;
    }

    /// Replace the buffer with `size` zero bytes.
    pub(crate) fn alloc(&mut self, size: usize) {
        self.buffer.clear();
        self.buffer.resize(size, 0);
        self.payload = 0..size;
    }

    /// Destination address stamped by the shipper.
    pub fn dst_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|udp| udp.dst_addr)
    }
}

/// Packet sink.
///
/// Implemented by transports, shippers, endpoints, and inbound queues.
/// Writers take `&self` so a handle can be shared between threads; each
/// implementation documents which threads may call it.
pub trait PacketWriter: Send + Sync {
    /// Accept ownership of a packet. Errors are returned to the caller
    /// unchanged; writers never retry.
    fn write(&self, packet: PacketPtr) -> Result<()>;
}

/// Protocol framing stage.
///
/// Composers are stateless with respect to individual packets: all
/// per-packet values (sequence numbers, block numbers) come from the
/// packet's metadata, filled in by the session.
pub trait Composer: Send + Sync {
    /// Bytes this stage and its inner stages add around the payload.
    fn overhead(&self) -> usize;

    /// Lay this stage out inside `frame` and record the ranges in the
    /// packet's metadata. The buffer must already cover `frame`.
    fn layout(&self, packet: &mut Packet, frame: Range<usize>) -> Result<()>;

    /// Mark the trailing `padding_size` payload bytes as padding.
    fn pad(&self, packet: &mut Packet, padding_size: usize) -> Result<()>;

    /// Serialize framing from metadata into the buffer.
    fn compose(&self, packet: &mut Packet) -> Result<()>;

    /// Allocate a buffer for `payload_size` bytes of payload and lay out
    /// every stage around it.
    fn prepare(&self, packet: &mut Packet, payload_size: usize) -> Result<()> {
        let size = self
            .overhead()
            .checked_add(payload_size)
            .ok_or(SendError::BadLayout("packet size overflows"))?;
        packet.alloc(size);
        self.layout(packet, 0..size)?;
        packet.add_flags(FLAG_PREPARED);
        Ok(())
    }
}

/// Inbound decoding stage.
pub trait Parser: Send + Sync {
    /// Decode the packet's buffer into its metadata.
    fn parse(&self, packet: &mut Packet) -> Result<()>;
}
