use std::net::SocketAddr;
use std::sync::Arc;

use super::{Composer, FLAG_COMPOSED, FLAG_UDP, PacketPtr, PacketWriter, UdpMeta};
use crate::error::Result;

/// Last outbound stage of an endpoint.
///
/// Serializes framing if the packet has not been composed yet, stamps the
/// destination address, and forwards the packet to the transport writer.
/// Every packet is forwarded exactly once, in the order of `write` calls.
/// Transport errors come back unchanged; nothing is retried here.
pub struct Shipper<C> {
    composer: C,
    writer: Arc<dyn PacketWriter>,
    address: SocketAddr,
}

impl<C: Composer> Shipper<C> {
    pub fn new(composer: C, writer: Arc<dyn PacketWriter>, address: SocketAddr) -> Self {
        Self {
            composer,
            writer,
            address,
        }
    }

    /// Composer used for packets that arrive uncomposed.
    pub fn composer(&self) -> &C {
        &self.composer
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl<C: Composer> PacketWriter for Shipper<C> {
    fn write(&self, mut packet: PacketPtr) -> Result<()> {
        let p = Arc::make_mut(&mut packet);

        if !p.has_flags(FLAG_COMPOSED) {
            self.composer.compose(p)?;
            p.add_flags(FLAG_COMPOSED);
        }

        p.udp.get_or_insert_with(UdpMeta::default).dst_addr = Some(self.address);
        p.add_flags(FLAG_UDP);

        tracing::trace!(dst = %self.address, len = p.len(), "shipping packet");
        self.writer.write(packet)
    }
}
