use std::ops::Range;

use super::walk_compound;
use crate::error::{Result, SendError};
use crate::packet::{Composer, FLAG_RTCP, Packet, RtcpMeta};

/// RTCP composer.
///
/// The session writes a complete compound packet (see
/// [`SenderReport`](super::SenderReport)) into the payload; composing only
/// checks that what goes on the wire is a valid compound packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcpComposer;

impl RtcpComposer {
    pub fn new() -> Self {
        Self
    }
}

impl Composer for RtcpComposer {
    fn overhead(&self) -> usize {
        0
    }

    fn layout(&self, packet: &mut Packet, frame: Range<usize>) -> Result<()> {
        if frame.end > packet.len() {
            return Err(SendError::BadLayout("RTCP frame exceeds buffer"));
        }
        packet.rtcp.get_or_insert_with(RtcpMeta::default).payload = frame.clone();
        packet.set_payload(frame);
        packet.add_flags(FLAG_RTCP);
        Ok(())
    }

    fn pad(&self, _packet: &mut Packet, _padding_size: usize) -> Result<()> {
        Err(SendError::BadLayout("RTCP padding belongs to the report builder"))
    }

    fn compose(&self, packet: &mut Packet) -> Result<()> {
        let rtcp = packet.rtcp.as_ref().ok_or(SendError::MissingMetadata("rtcp"))?;
        let payload = rtcp.payload.clone();
        if payload.end > packet.len() {
            return Err(SendError::BadLayout("RTCP packet was not prepared"));
        }

        match walk_compound(&packet.buffer()[payload.clone()], payload.start) {
            Ok(blocks) => {
                if let Some(rtcp) = packet.rtcp.as_mut() {
                    rtcp.blocks = blocks;
                }
                Ok(())
            }
            Err(kind) => {
                tracing::debug!(%kind, "refusing to compose malformed RTCP");
                Err(SendError::BadLayout("malformed RTCP compound packet"))
            }
        }
    }
}
