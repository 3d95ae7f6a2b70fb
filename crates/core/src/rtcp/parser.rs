use super::walk_compound;
use crate::error::Result;
use crate::packet::{FLAG_PARSED, FLAG_RTCP, Packet, Parser, RtcpMeta};

/// Validates inbound RTCP compound packets and indexes their sub-packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcpParser;

impl RtcpParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for RtcpParser {
    fn parse(&self, packet: &mut Packet) -> Result<()> {
        let len = packet.len();
        let blocks = walk_compound(packet.buffer(), 0)?;

        packet.rtcp = Some(RtcpMeta {
            payload: 0..len,
            blocks,
        });
        packet.set_payload(0..len);
        packet.add_flags(FLAG_RTCP | FLAG_PARSED);
        Ok(())
    }
}
