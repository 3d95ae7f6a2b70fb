//! Network transport for endpoint packets.
//!
//! The pipeline only sees transports through
//! [`PacketWriter`](crate::packet::PacketWriter). [`UdpTransport`] is the
//! writer used by the CLI: a single socket that sends every packet to the
//! address stamped by the endpoint's shipper, and that a network thread
//! can read feedback datagrams from.

pub mod udp;

pub use udp::UdpTransport;
