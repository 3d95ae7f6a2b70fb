use std::time::Duration;

use super::{PT_SDES, PT_SR};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

const SDES_CNAME: u8 = 1;

/// Minimal RTCP sender report (RFC 3550 §6.4.1) without report blocks,
/// optionally followed by an SDES chunk carrying the sender's CNAME.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// 64-bit NTP timestamp (32.32 fixed point).
    pub ntp_timestamp: u64,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    /// Truncated to 255 bytes.
    pub cname: Option<String>,
}

impl SenderReport {
    /// Serialize into a compound packet.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);

        buf.extend_from_slice(&[0x80, PT_SR, 0, 6]);
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        buf.extend_from_slice(&self.ntp_timestamp.to_be_bytes());
        buf.extend_from_slice(&self.rtp_timestamp.to_be_bytes());
        buf.extend_from_slice(&self.packet_count.to_be_bytes());
        buf.extend_from_slice(&self.octet_count.to_be_bytes());

        if let Some(cname) = &self.cname {
            let text = &cname.as_bytes()[..cname.len().min(u8::MAX as usize)];
            let start = buf.len();

            buf.extend_from_slice(&[0x81, PT_SDES, 0, 0]);
            buf.extend_from_slice(&self.ssrc.to_be_bytes());
            buf.push(SDES_CNAME);
            buf.push(text.len() as u8);
            buf.extend_from_slice(text);
            // END item, then pad the chunk to a 32-bit boundary.
            buf.push(0);
            while buf.len() % 4 != 0 {
                buf.push(0);
            }

            let words = ((buf.len() - start) / 4 - 1) as u16;
            buf[start + 2..start + 4].copy_from_slice(&words.to_be_bytes());
        }

        buf
    }
}

/// Convert time since the Unix epoch to a 32.32 NTP timestamp.
pub fn ntp_timestamp(since_unix_epoch: Duration) -> u64 {
    let secs = since_unix_epoch.as_secs() + NTP_UNIX_OFFSET_SECS;
    let frac = ((since_unix_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (secs << 32) | frac
}
