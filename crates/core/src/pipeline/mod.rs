//! Sender endpoint pipeline.
//!
//! A sender session owns one [`SenderEndpoint`] per destination/protocol
//! pair, e.g. an `rtp+rs8m` endpoint for source packets, an `rs8m`
//! endpoint for repair packets, and an `rtcp` endpoint for control.
//!
//! Each endpoint owns:
//!
//! - a [`ComposerChain`] chosen by protocol at construction,
//! - a [`Shipper`](crate::packet::Shipper) that composes, addresses, and
//!   forwards outbound packets,
//! - for control protocols, an [`InboundQueue`] fed by network threads and
//!   drained by the pipeline thread through an RTCP parser.
//!
//! The shared [`StateTracker`] counts pending inbound packets so the
//! enclosing run-loop knows when the pipeline thread has work.

pub mod chain;
pub mod endpoint;
pub mod inbound;
pub mod state_tracker;

pub use chain::{ChainHead, ComposerChain};
pub use endpoint::{
    DEFAULT_MAX_PACKET_SIZE, EndpointConfig, EndpointStats, SenderEndpoint, SessionRouter,
};
pub use inbound::InboundQueue;
pub use state_tracker::{SenderState, StateTracker};
