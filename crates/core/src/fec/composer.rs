use std::ops::Range;

use super::{PAYLOAD_ID_SIZE, write_payload_id};
use crate::address::FecScheme;
use crate::error::{Result, SendError};
use crate::media::RtpComposer;
use crate::packet::{Composer, FLAG_FEC, FLAG_REPAIR, FecMeta, Packet};

/// Where the payload ID sits relative to the inner frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadIdPosition {
    /// Before the repair symbol.
    Header,
    /// After the RTP source packet.
    Footer,
}

/// FEC payload ID composer.
///
/// Source composers wrap an [`RtpComposer`]; repair composers have no
/// inner stage. Block and symbol numbers come from the packet's
/// [`FecMeta`]; the composer does no encoding of its own.
#[derive(Debug, Clone)]
pub struct FecComposer {
    scheme: FecScheme,
    position: PayloadIdPosition,
    inner: Option<RtpComposer>,
}

impl FecComposer {
    /// Composer for source packets: RTP followed by a payload ID footer.
    pub fn source(scheme: FecScheme, inner: RtpComposer) -> Self {
        Self {
            scheme,
            position: PayloadIdPosition::Footer,
            inner: Some(inner),
        }
    }

    /// Composer for repair packets: payload ID header followed by the symbol.
    pub fn repair(scheme: FecScheme) -> Self {
        Self {
            scheme,
            position: PayloadIdPosition::Header,
            inner: None,
        }
    }

    pub fn scheme(&self) -> FecScheme {
        self.scheme
    }

    pub fn position(&self) -> PayloadIdPosition {
        self.position
    }
}

impl Composer for FecComposer {
    fn overhead(&self) -> usize {
        PAYLOAD_ID_SIZE + self.inner.as_ref().map_or(0, |c| c.overhead())
    }

    fn layout(&self, packet: &mut Packet, frame: Range<usize>) -> Result<()> {
        if frame.len() < PAYLOAD_ID_SIZE || frame.end > packet.len() {
            return Err(SendError::BadLayout("frame too short for FEC payload ID"));
        }

        let (payload_id, inner_frame) = match self.position {
            PayloadIdPosition::Header => (
                frame.start..frame.start + PAYLOAD_ID_SIZE,
                frame.start + PAYLOAD_ID_SIZE..frame.end,
            ),
            PayloadIdPosition::Footer => (
                frame.end - PAYLOAD_ID_SIZE..frame.end,
                frame.start..frame.end - PAYLOAD_ID_SIZE,
            ),
        };

        let fec = packet
            .fec
            .get_or_insert_with(|| FecMeta::new(self.scheme));
        fec.scheme = self.scheme;
        fec.payload_id = payload_id;
        fec.payload = inner_frame.clone();

        packet.add_flags(FLAG_FEC);
        match &self.inner {
            Some(inner) => inner.layout(packet, inner_frame),
            None => {
                packet.set_payload(inner_frame);
                packet.add_flags(FLAG_REPAIR);
                Ok(())
            }
        }
    }

    fn pad(&self, packet: &mut Packet, padding_size: usize) -> Result<()> {
        match &self.inner {
            Some(inner) => inner.pad(packet, padding_size),
            None => Err(SendError::BadLayout("repair packets cannot be padded")),
        }
    }

    fn compose(&self, packet: &mut Packet) -> Result<()> {
        let fec = packet.fec.clone().ok_or(SendError::MissingMetadata("fec"))?;
        if fec.payload_id.end > packet.len() {
            return Err(SendError::BadLayout("FEC packet was not prepared"));
        }
        write_payload_id(&fec, &mut packet.buffer_mut()[fec.payload_id.clone()])?;

        match &self.inner {
            Some(inner) => inner.compose(packet),
            None => Ok(()),
        }
    }
}
