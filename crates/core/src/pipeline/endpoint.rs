use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::chain::{ComposerChain, build_stages};
use super::{InboundQueue, StateTracker};
use crate::address::Protocol;
use crate::arena::{Arena, ArenaLease};
use crate::error::{Result, SendError};
use crate::packet::{PacketPtr, PacketWriter, Parser, Shipper};
use crate::rtcp::RtcpParser;

/// Largest UDP payload that fits a 1500-byte Ethernet MTU over IPv4.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1472;

/// Endpoint-level configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Upper bound on a framed packet, checked when a packet is prepared.
    pub max_packet_size: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

/// Feedback entry point of the session owning an endpoint.
pub trait SessionRouter: Send + Sync {
    /// Handle one parsed inbound packet. An error is treated as fatal and
    /// ends the current [`SenderEndpoint::pull_packets`] batch.
    fn route_packet(&self, packet: PacketPtr, current_time: Duration) -> Result<()>;
}

/// Cumulative inbound counters of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Packets taken off the inbound queue.
    pub drained: u64,
    /// Drained packets that parsed.
    pub parsed: u64,
    /// Parsed packets accepted by the session.
    pub routed: u64,
    /// Drained packets skipped as malformed.
    pub parse_failures: u64,
}

/// Packet pipeline for a single destination and protocol.
///
/// ```text
/// outbound:  session -> write() -> Shipper(compose, stamp address) -> transport
/// inbound:   netio -> inbound_writer() -> queue -> pull_packets() -> parser -> session
/// ```
///
/// Construction never fails outright. Check [`is_valid`](Self::is_valid)
/// right after [`new`](Self::new) and drop the endpoint if it is false.
///
/// Threads: [`inbound_writer`](Self::inbound_writer) hands out a handle
/// that any thread may write to. Everything else belongs to the pipeline
/// thread; `pull_packets` takes `&mut self`, so draining can't overlap.
pub struct SenderEndpoint {
    proto: Protocol,
    state_tracker: Arc<StateTracker>,
    session: Weak<dyn SessionRouter>,
    pipeline: Option<Pipeline>,
    init_error: Option<SendError>,
    stats: EndpointStats,
}

struct Pipeline {
    shipper: Shipper<ComposerChain>,
    inbound: Option<Inbound>,
    // Declared last: released after the stages above are dropped.
    _leases: Vec<ArenaLease>,
}

struct Inbound {
    parser: RtcpParser,
    queue: Arc<InboundQueue>,
}

impl SenderEndpoint {
    /// Build an endpoint with the default [`EndpointConfig`].
    ///
    /// - `outbound_address` is stamped on every outgoing packet.
    /// - `outbound_writer` receives packets at the end of the pipeline.
    /// - `session` and `state_tracker` must outlive the endpoint.
    pub fn new(
        proto: Protocol,
        state_tracker: Arc<StateTracker>,
        session: Weak<dyn SessionRouter>,
        outbound_address: SocketAddr,
        outbound_writer: Arc<dyn PacketWriter>,
        arena: Arc<dyn Arena>,
    ) -> Self {
        Self::with_config(
            EndpointConfig::default(),
            proto,
            state_tracker,
            session,
            outbound_address,
            outbound_writer,
            arena,
        )
    }

    /// Build an endpoint with an explicit [`EndpointConfig`].
    pub fn with_config(
        config: EndpointConfig,
        proto: Protocol,
        state_tracker: Arc<StateTracker>,
        session: Weak<dyn SessionRouter>,
        outbound_address: SocketAddr,
        outbound_writer: Arc<dyn PacketWriter>,
        arena: Arc<dyn Arena>,
    ) -> Self {
        let built = Pipeline::build(
            proto,
            &config,
            &state_tracker,
            outbound_address,
            outbound_writer,
            &arena,
        );

        let (pipeline, init_error) = match built {
            Ok(pipeline) => {
                tracing::debug!(
                    %proto,
                    dst = %outbound_address,
                    inbound = pipeline.inbound.is_some(),
                    "sender endpoint created"
                );
                (Some(pipeline), None)
            }
            Err(e) => {
                tracing::warn!(%proto, dst = %outbound_address, error = %e, "can't build sender endpoint");
                (None, Some(e))
            }
        };

        Self {
            proto,
            state_tracker,
            session,
            pipeline,
            init_error,
            stats: EndpointStats::default(),
        }
    }

    /// Whether construction succeeded. Never changes afterwards.
    pub fn is_valid(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Why construction failed, for an invalid endpoint.
    pub fn init_error(&self) -> Option<&SendError> {
        self.init_error.as_ref()
    }

    pub fn proto(&self) -> Protocol {
        self.proto
    }

    /// Composer producing packets in this endpoint's protocol.
    ///
    /// `None` only for an invalid endpoint.
    pub fn composer(&self) -> Option<&ComposerChain> {
        self.pipeline.as_ref().map(|p| p.shipper.composer())
    }

    /// Where the session writes packets bound for the network.
    pub fn outbound_writer(&self) -> &dyn PacketWriter {
        self
    }

    /// Thread-safe, lock-free sink for feedback packets from the network.
    ///
    /// `None` if the protocol has no inbound channel. Every call returns a
    /// handle to the same queue. Packets written here become visible to the
    /// session at the next [`pull_packets`](Self::pull_packets).
    pub fn inbound_writer(&self) -> Option<Arc<dyn PacketWriter>> {
        let inbound = self.pipeline.as_ref()?.inbound.as_ref()?;
        let writer: Arc<dyn PacketWriter> = inbound.queue.clone();
        Some(writer)
    }

    /// Drain packets queued by [`inbound_writer`](Self::inbound_writer),
    /// parse them, and route them to the session.
    ///
    /// Drains the packets present when the call starts. Malformed packets
    /// are counted and skipped. A routing error stops the batch and is
    /// returned; undrained packets stay queued.
    pub fn pull_packets(&mut self, current_time: Duration) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or(SendError::InvalidEndpoint)?;
        let Some(inbound) = pipeline.inbound.as_ref() else {
            return Ok(());
        };

        let pending = inbound.queue.len();
        if pending == 0 {
            return Ok(());
        }
        let session = self.session.upgrade().ok_or(SendError::SessionGone)?;

        for _ in 0..pending {
            let Some(mut packet) = inbound.queue.pop() else {
                break;
            };
            self.stats.drained += 1;

            if let Err(e) = inbound.parser.parse(Arc::make_mut(&mut packet)) {
                self.stats.parse_failures += 1;
                tracing::debug!(proto = %self.proto, error = %e, "skipping malformed inbound packet");
                continue;
            }
            self.stats.parsed += 1;

            if let Err(e) = session.route_packet(packet, current_time) {
                tracing::warn!(proto = %self.proto, error = %e, "session failed to route inbound packet");
                return Err(e);
            }
            self.stats.routed += 1;
        }

        tracing::trace!(
            proto = %self.proto,
            pending = self.state_tracker.num_pending_packets(),
            drained = self.stats.drained,
            "pulled inbound packets"
        );
        Ok(())
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }
}

impl PacketWriter for SenderEndpoint {
    /// Forward an outbound packet to the shipper; its status is returned
    /// unchanged.
    fn write(&self, packet: PacketPtr) -> Result<()> {
        let pipeline = self.pipeline.as_ref().ok_or(SendError::InvalidEndpoint)?;
        pipeline.shipper.write(packet)
    }
}

impl Pipeline {
    fn build(
        proto: Protocol,
        config: &EndpointConfig,
        state_tracker: &Arc<StateTracker>,
        outbound_address: SocketAddr,
        outbound_writer: Arc<dyn PacketWriter>,
        arena: &Arc<dyn Arena>,
    ) -> Result<Self> {
        let stages = build_stages(proto, config, arena)?;
        let mut leases = stages.leases;

        let inbound = stages.parser.map(|parser| Inbound {
            parser,
            queue: Arc::new(InboundQueue::new(state_tracker.clone())),
        });

        leases.push(ArenaLease::for_type::<Shipper<ComposerChain>>(arena, "shipper")?);
        let shipper = Shipper::new(stages.chain, outbound_writer, outbound_address);

        Ok(Self {
            shipper,
            inbound,
            _leases: leases,
        })
    }
}
