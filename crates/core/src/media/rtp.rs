use std::ops::Range;

use crate::error::{Result, SendError};
use crate::packet::{Composer, FLAG_RTP, Packet, RtpMeta};

/// Size of the RTP fixed header without CSRCs.
pub const RTP_HEADER_SIZE: usize = 12;

const RTP_VERSION: u8 = 2;

/// RTP fixed header composer (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Header fields come from the packet's [`RtpMeta`]; the composer holds no
/// per-stream state. Extension and CSRC count are always 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtpComposer;

impl RtpComposer {
    pub fn new() -> Self {
        Self
    }
}

impl Composer for RtpComposer {
    fn overhead(&self) -> usize {
        RTP_HEADER_SIZE
    }

    fn layout(&self, packet: &mut Packet, frame: Range<usize>) -> Result<()> {
        if frame.len() < RTP_HEADER_SIZE || frame.end > packet.len() {
            return Err(SendError::BadLayout("frame too short for RTP header"));
        }
        let payload = frame.start + RTP_HEADER_SIZE..frame.end;

        let rtp = packet.rtp.get_or_insert_with(RtpMeta::default);
        rtp.header = frame.start..frame.start + RTP_HEADER_SIZE;
        rtp.payload = payload.clone();
        rtp.padding = 0;

        packet.set_payload(payload);
        packet.add_flags(FLAG_RTP);
        Ok(())
    }

    fn pad(&self, packet: &mut Packet, padding_size: usize) -> Result<()> {
        let rtp = packet.rtp.as_mut().ok_or(SendError::MissingMetadata("rtp"))?;
        check_padding(padding_size, &rtp.payload)?;
        rtp.padding = padding_size;
        Ok(())
    }

    fn compose(&self, packet: &mut Packet) -> Result<()> {
        let rtp = packet.rtp.clone().ok_or(SendError::MissingMetadata("rtp"))?;
        if rtp.header.len() != RTP_HEADER_SIZE
            || rtp.header.end > packet.len()
            || rtp.payload.end > packet.len()
        {
            return Err(SendError::BadLayout("RTP packet was not prepared"));
        }
        check_padding(rtp.padding, &rtp.payload)?;

        let padding_bit = u8::from(rtp.padding > 0) << 5;
        let buf = packet.buffer_mut();

        let header = &mut buf[rtp.header.clone()];
        header[0] = (RTP_VERSION << 6) | padding_bit;
        header[1] = (u8::from(rtp.marker) << 7) | (rtp.payload_type & 0x7f);
        header[2..4].copy_from_slice(&rtp.seqnum.to_be_bytes());
        header[4..8].copy_from_slice(&rtp.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&rtp.ssrc.to_be_bytes());

        if rtp.padding > 0 {
            let pad = &mut buf[rtp.payload.end - rtp.padding..rtp.payload.end];
            pad.fill(0);
            pad[rtp.padding - 1] = rtp.padding as u8;
        }
        Ok(())
    }
}

/// Padding count goes in one byte and is carved out of the payload.
fn check_padding(padding: usize, payload: &Range<usize>) -> Result<()> {
    if padding > u8::MAX as usize || padding > payload.len() {
        return Err(SendError::BadLayout("RTP padding does not fit payload"));
    }
    Ok(())
}

/// Per-stream RTP header state for a session.
///
/// Hands out [`RtpMeta`] for consecutive packets:
/// - **Sequence number**: 16-bit, wrapping, incremented on every packet.
/// - **Timestamp**: kept as u64 internally; the lower 32 bits go on the wire.
/// - **SSRC**: random per RFC 3550 §8.1 unless given explicitly.
#[derive(Debug)]
pub struct RtpSequencer {
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u64,
}

impl RtpSequencer {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP stream state created"
        );
        Self {
            payload_type,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC to avoid collisions between senders.
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::new(payload_type, rand::random::<u32>())
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Metadata for the next packet; advances the sequence number.
    pub fn next_meta(&mut self, marker: bool) -> RtpMeta {
        let meta = RtpMeta {
            payload_type: self.payload_type,
            seqnum: self.sequence,
            timestamp: self.timestamp as u32,
            ssrc: self.ssrc,
            marker,
            ..RtpMeta::default()
        };
        self.sequence = self.sequence.wrapping_add(1);
        meta
    }

    /// Advance the media clock, e.g. by samples per packet for audio.
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment as u64);
    }
}
