//! RTCP control channel (RFC 3550 §6).
//!
//! On the sender, the control endpoint carries two directions:
//!
//! - **Outbound**: sender reports built by the session, framed by
//!   [`RtcpComposer`].
//! - **Inbound**: receiver feedback, validated by [`RtcpParser`] before it
//!   is handed to the session.
//!
//! Both directions share one validity check for compound packets
//! (RFC 3550 §6.1 and A.2):
//!
//! - every sub-packet has version 2,
//! - the first sub-packet is SR or RR and has no padding,
//! - only the last sub-packet may carry padding,
//! - sub-packet lengths add up exactly to the buffer length.

pub mod composer;
pub mod parser;
pub mod report;

use crate::error::ParseErrorKind;
use crate::packet::RtcpBlock;

pub use composer::RtcpComposer;
pub use parser::RtcpParser;
pub use report::SenderReport;

pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;

const HEADER_SIZE: usize = 4;

/// Split a compound packet into sub-packets, checking validity.
///
/// Ranges in the result are offset by `base`.
pub(crate) fn walk_compound(
    buf: &[u8],
    base: usize,
) -> std::result::Result<Vec<RtcpBlock>, ParseErrorKind> {
    if buf.is_empty() {
        return Err(ParseErrorKind::Empty);
    }
    if buf.len() % 4 != 0 {
        return Err(ParseErrorKind::Misaligned);
    }

    let mut blocks = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let header = &buf[offset..offset + HEADER_SIZE];
        if header[0] >> 6 != 2 {
            return Err(ParseErrorKind::BadVersion);
        }
        let padding = header[0] & 0x20 != 0;
        let count = header[0] & 0x1f;
        let packet_type = header[1];
        let size = (u16::from_be_bytes([header[2], header[3]]) as usize + 1) * 4;

        if offset + size > buf.len() {
            return Err(ParseErrorKind::BadLength);
        }
        if blocks.is_empty() {
            if packet_type != PT_SR && packet_type != PT_RR {
                return Err(ParseErrorKind::BadFirstPacket);
            }
            if padding {
                return Err(ParseErrorKind::BadPadding);
            }
        }
        if padding && offset + size != buf.len() {
            return Err(ParseErrorKind::BadPadding);
        }

        blocks.push(RtcpBlock {
            packet_type,
            count,
            range: base + offset..base + offset + size,
        });
        offset += size;
    }

    Ok(blocks)
}
