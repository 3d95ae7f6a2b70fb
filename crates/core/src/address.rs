//! Endpoint protocol tags.
//!
//! A sender talks to each destination with exactly one protocol. The tag
//! decides which composers frame outgoing packets and whether the endpoint
//! accepts feedback from the network.
//!
//! | Tag | Name | Framing | Inbound |
//! |-----|------|---------|---------|
//! | [`Rtp`](Protocol::Rtp) | `rtp` | RTP | no |
//! | [`RtpRs8mSource`](Protocol::RtpRs8mSource) | `rtp+rs8m` | RTP + RS8M footer | no |
//! | [`Rs8mRepair`](Protocol::Rs8mRepair) | `rs8m` | RS8M header + symbol | no |
//! | [`RtpLdpcSource`](Protocol::RtpLdpcSource) | `rtp+ldpc` | RTP + LDPC footer | no |
//! | [`LdpcRepair`](Protocol::LdpcRepair) | `ldpc` | LDPC header + symbol | no |
//! | [`Rtcp`](Protocol::Rtcp) | `rtcp` | RTCP compound | yes |

use std::fmt;
use std::str::FromStr;

use crate::error::SendError;

/// Forward-error-correction scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FecScheme {
    /// Reed-Solomon over GF(2^8) (RFC 6865).
    ReedSolomonM8,
    /// LDPC-Staircase (RFC 6816).
    LdpcStaircase,
}

/// Wire protocol of a single sender endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Unset. No pipeline can be built for it.
    #[default]
    None,
    /// Bare RTP media.
    Rtp,
    /// RTP source packets protected by Reed-Solomon.
    RtpRs8mSource,
    /// Reed-Solomon repair packets.
    Rs8mRepair,
    /// RTP source packets protected by LDPC-Staircase.
    RtpLdpcSource,
    /// LDPC-Staircase repair packets.
    LdpcRepair,
    /// RTCP control and feedback.
    Rtcp,
}

impl Protocol {
    /// Every protocol a pipeline can be built for.
    pub const SUPPORTED: [Protocol; 6] = [
        Protocol::Rtp,
        Protocol::RtpRs8mSource,
        Protocol::Rs8mRepair,
        Protocol::RtpLdpcSource,
        Protocol::LdpcRepair,
        Protocol::Rtcp,
    ];

    /// FEC scheme requested by this protocol, if any.
    pub fn fec_scheme(self) -> Option<FecScheme> {
        match self {
            Protocol::RtpRs8mSource | Protocol::Rs8mRepair => Some(FecScheme::ReedSolomonM8),
            Protocol::RtpLdpcSource | Protocol::LdpcRepair => Some(FecScheme::LdpcStaircase),
            _ => None,
        }
    }

    /// Whether packets carry repair symbols rather than media.
    pub fn is_repair(self) -> bool {
        matches!(self, Protocol::Rs8mRepair | Protocol::LdpcRepair)
    }

    /// Whether packets carry RTP media.
    pub fn has_media(self) -> bool {
        matches!(
            self,
            Protocol::Rtp | Protocol::RtpRs8mSource | Protocol::RtpLdpcSource
        )
    }

    /// Whether this is a control channel with inbound feedback.
    pub fn has_control(self) -> bool {
        self == Protocol::Rtcp
    }

    /// Short name, as used in endpoint URIs.
    pub fn name(self) -> &'static str {
        match self {
            Protocol::None => "none",
            Protocol::Rtp => "rtp",
            Protocol::RtpRs8mSource => "rtp+rs8m",
            Protocol::Rs8mRepair => "rs8m",
            Protocol::RtpLdpcSource => "rtp+ldpc",
            Protocol::LdpcRepair => "ldpc",
            Protocol::Rtcp => "rtcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = SendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::SUPPORTED
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or(SendError::UnsupportedProtocol(Protocol::None))
    }
}
