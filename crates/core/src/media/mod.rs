//! Media framing.
//!
//! Media packets are RTP (RFC 3550). Every packet carries a 12-byte fixed
//! header containing:
//!
//! - **Sequence number** (16-bit, wrapping) for reordering and loss detection.
//! - **Timestamp** (32-bit) in media clock units, e.g. samples for audio.
//! - **SSRC** (32-bit), randomly chosen to identify the sender.
//! - **Marker bit**, set on the first packet after a silence gap.
//!
//! [`rtp::RtpComposer`] serializes the header from packet metadata, and
//! [`rtp::RtpSequencer`] produces that metadata for a session's stream.

pub mod rtp;

pub use rtp::{RtpComposer, RtpSequencer};
