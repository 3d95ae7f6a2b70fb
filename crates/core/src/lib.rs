pub mod address;
pub mod arena;
pub mod error;
pub mod fec;
pub mod media;
pub mod packet;
pub mod pipeline;
pub mod rtcp;
pub mod transport;

pub use address::{FecScheme, Protocol};
pub use arena::{Arena, HeapArena, LimitedArena};
pub use error::{Result, SendError};
pub use packet::{Composer, Packet, PacketPtr, PacketWriter, Parser};
pub use pipeline::{EndpointConfig, SenderEndpoint, SessionRouter, StateTracker};
pub use transport::UdpTransport;
