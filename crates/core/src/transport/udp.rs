use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SendError};
use crate::packet::{Packet, PacketPtr, PacketWriter, UdpMeta};

/// Largest UDP payload over IPv4; nothing the socket delivers is truncated.
const RECV_BUFFER_SIZE: usize = 65_535;

/// UDP socket used as an endpoint's transport writer.
///
/// As a [`PacketWriter`] it sends each packet to the destination address
/// the shipper stamped on it. It knows nothing about protocols or
/// sessions. Clones share the socket, so one clone can block in
/// [`recv_packet`](Self::recv_packet) on a network thread while another
/// sends.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket.
    pub fn bind() -> Result<Self> {
        Self::bind_addr(SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    pub fn bind_addr(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        tracing::debug!(local = %socket.local_addr()?, "UDP transport bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Limit how long [`recv_packet`](Self::recv_packet) blocks.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }

    /// Block until a datagram arrives and wrap it as an inbound packet.
    pub fn recv_packet(&self) -> Result<Packet> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let (len, src) = self.socket.recv_from(&mut buf)?;

        let mut packet = Packet::from_bytes(&buf[..len]);
        packet.udp = Some(UdpMeta {
            src_addr: Some(src),
            dst_addr: self.socket.local_addr().ok(),
        });
        Ok(packet)
    }
}

impl PacketWriter for UdpTransport {
    fn write(&self, packet: PacketPtr) -> Result<()> {
        let dst = packet.dst_addr().ok_or(SendError::MissingMetadata("udp"))?;
        self.send_to(packet.buffer(), dst)?;
        Ok(())
    }
}
