use std::ops::Range;
use std::sync::Arc;

use super::EndpointConfig;
use crate::address::Protocol;
use crate::arena::{Arena, ArenaLease};
use crate::error::{Result, SendError};
use crate::fec::FecComposer;
use crate::media::RtpComposer;
use crate::packet::{Composer, Packet};
use crate::rtcp::{RtcpComposer, RtcpParser};

/// Head stage of an endpoint's outbound chain.
///
/// Only the stages a protocol needs exist; FEC source composers own their
/// inner RTP composer.
#[derive(Debug, Clone)]
pub enum ChainHead {
    /// Bare RTP.
    Media(RtpComposer),
    /// FEC payload ID, wrapping RTP for source packets.
    Fec(FecComposer),
    /// RTCP.
    Control(RtcpComposer),
}

/// Composer chain selected for one protocol. Immutable once built.
#[derive(Debug, Clone)]
pub struct ComposerChain {
    head: ChainHead,
    max_packet_size: usize,
}

impl ComposerChain {
    pub fn head(&self) -> &ChainHead {
        &self.head
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn stage(&self) -> &dyn Composer {
        match &self.head {
            ChainHead::Media(c) => c,
            ChainHead::Fec(c) => c,
            ChainHead::Control(c) => c,
        }
    }
}

impl Composer for ComposerChain {
    fn overhead(&self) -> usize {
        self.stage().overhead()
    }

    fn layout(&self, packet: &mut Packet, frame: Range<usize>) -> Result<()> {
        self.stage().layout(packet, frame)
    }

    fn pad(&self, packet: &mut Packet, padding_size: usize) -> Result<()> {
        self.stage().pad(packet, padding_size)
    }

    fn compose(&self, packet: &mut Packet) -> Result<()> {
        self.stage().compose(packet)
    }

    fn prepare(&self, packet: &mut Packet, payload_size: usize) -> Result<()> {
        self.overhead()
            .checked_add(payload_size)
            .filter(|&size| size <= self.max_packet_size)
            .ok_or(SendError::PacketTooLarge {
                size: self.overhead().saturating_add(payload_size),
                max: self.max_packet_size,
            })?;
        self.stage().prepare(packet, payload_size)
    }
}

/// Sub-objects built for a protocol, with their arena reservations.
pub(crate) struct Stages {
    pub chain: ComposerChain,
    pub parser: Option<RtcpParser>,
    pub leases: Vec<ArenaLease>,
}

/// Decide and build the stages for `proto`.
///
/// | Protocol | Head | Parser |
/// |----------|------|--------|
/// | `rtp` | RTP | - |
/// | `rtp+rs8m`, `rtp+ldpc` | FEC footer over RTP | - |
/// | `rs8m`, `ldpc` | FEC header | - |
/// | `rtcp` | RTCP | RTCP |
///
/// Any refused allocation fails the whole build; leases taken so far are
/// returned when the partial result is dropped.
pub(crate) fn build_stages(
    proto: Protocol,
    config: &EndpointConfig,
    arena: &Arc<dyn Arena>,
) -> Result<Stages> {
    let mut leases = Vec::new();
    let mut parser = None;

    let head = match proto {
        Protocol::Rtp | Protocol::RtpRs8mSource | Protocol::RtpLdpcSource => {
            leases.push(ArenaLease::for_type::<RtpComposer>(arena, "rtp composer")?);
            let rtp = RtpComposer::new();

            match proto.fec_scheme() {
                Some(scheme) => {
                    leases.push(ArenaLease::for_type::<FecComposer>(arena, "fec composer")?);
                    ChainHead::Fec(FecComposer::source(scheme, rtp))
                }
                None => ChainHead::Media(rtp),
            }
        }
        Protocol::Rs8mRepair | Protocol::LdpcRepair => {
            let scheme = proto
                .fec_scheme()
                .ok_or(SendError::UnsupportedProtocol(proto))?;
            leases.push(ArenaLease::for_type::<FecComposer>(arena, "fec composer")?);
            ChainHead::Fec(FecComposer::repair(scheme))
        }
        Protocol::Rtcp => {
            leases.push(ArenaLease::for_type::<RtcpComposer>(arena, "rtcp composer")?);
            leases.push(ArenaLease::for_type::<RtcpParser>(arena, "rtcp parser")?);
            parser = Some(RtcpParser::new());
            ChainHead::Control(RtcpComposer::new())
        }
        Protocol::None => return Err(SendError::UnsupportedProtocol(proto)),
    };

    Ok(Stages {
        chain: ComposerChain {
            head,
            max_packet_size: config.max_packet_size,
        },
        parser,
        leases,
    })
}
