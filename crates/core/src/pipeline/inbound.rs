use std::sync::Arc;

use crossbeam::queue::SegQueue;

use super::StateTracker;
use crate::error::Result;
use crate::packet::{PacketPtr, PacketWriter};

/// Lock-free queue of inbound packets for one endpoint.
///
/// - **Producers**: any number of network threads, through
///   [`PacketWriter::write`]. Never blocks, never drops.
/// - **Consumer**: the pipeline thread, inside
///   [`SenderEndpoint::pull_packets`](super::SenderEndpoint::pull_packets).
///
/// Backed by crossbeam's segmented queue (CAS on linked segments), which is
/// unbounded and FIFO per producer. Single-consumer discipline comes from
/// the endpoint: `pull_packets` borrows the endpoint mutably.
pub struct InboundQueue {
    queue: SegQueue<PacketPtr>,
    state_tracker: Arc<StateTracker>,
}

impl InboundQueue {
    pub(crate) fn new(state_tracker: Arc<StateTracker>) -> Self {
        Self {
            queue: SegQueue::new(),
            state_tracker,
        }
    }

    pub(crate) fn pop(&self) -> Option<PacketPtr> {
        let packet = self.queue.pop()?;
        self.state_tracker.add_pending_packets(-1);
        Some(packet)
    }

    /// Packets currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl PacketWriter for InboundQueue {
    fn write(&self, packet: PacketPtr) -> Result<()> {
        // Count first so the tracker never reports fewer pending packets
        // than the queue holds.
        self.state_tracker.add_pending_packets(1);
        self.queue.push(packet);
        Ok(())
    }
}

impl Drop for InboundQueue {
    fn drop(&mut self) {
        let leftover = self.queue.len() as i64;
        if leftover > 0 {
            self.state_tracker.add_pending_packets(-leftover);
            tracing::debug!(leftover, "discarding undrained inbound packets");
        }
    }
}
