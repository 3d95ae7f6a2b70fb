//! Integration tests: sender endpoint construction, outbound shipping, and
//! inbound feedback draining across threads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use sendpipe::address::FecScheme;
use sendpipe::media::RtpSequencer;
use sendpipe::packet::{FLAG_COMPOSED, FLAG_PARSED, FLAG_RTCP, FLAG_UDP, FecMeta};
use sendpipe::pipeline::EndpointStats;
use sendpipe::rtcp::SenderReport;
use sendpipe::{
    Arena, Composer, EndpointConfig, HeapArena, Packet, PacketPtr, PacketWriter, Protocol,
    Result, SendError, SenderEndpoint, SessionRouter, StateTracker,
};

#[derive(Default)]
struct RecordingWriter {
    packets: Mutex<Vec<PacketPtr>>,
}

impl PacketWriter for RecordingWriter {
    fn write(&self, packet: PacketPtr) -> Result<()> {
        self.packets.lock().push(packet);
        Ok(())
    }
}

struct RefusingWriter;

impl PacketWriter for RefusingWriter {
    fn write(&self, _packet: PacketPtr) -> Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
    }
}

#[derive(Default)]
struct RecordingSession {
    routed: Mutex<Vec<PacketPtr>>,
    /// Fail every route call once this many packets were accepted.
    fail_after: Option<usize>,
}

impl SessionRouter for RecordingSession {
    fn route_packet(&self, packet: PacketPtr, _current_time: Duration) -> Result<()> {
        let mut routed = self.routed.lock();
        if self.fail_after.is_some_and(|n| routed.len() >= n) {
            return Err(SendError::Aborted("session closed".into()));
        }
        routed.push(packet);
        Ok(())
    }
}

/// Arena that refuses exactly the `fail_on`-th allocation (1-based).
struct FailingArena {
    fail_on: usize,
    calls: AtomicUsize,
    allocated: AtomicUsize,
}

impl FailingArena {
    fn new(fail_on: usize) -> Self {
        Self {
            fail_on,
            calls: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        }
    }
}

impl Arena for FailingArena {
    fn allocate(&self, size: usize) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return false;
        }
        self.allocated.fetch_add(size, Ordering::SeqCst);
        true
    }

    fn deallocate(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::SeqCst);
    }
}

/// Session that writes one more packet into the endpoint's inbound queue
/// while it is being drained.
#[derive(Default)]
struct RequeueingSession {
    inbound: Mutex<Option<Arc<dyn PacketWriter>>>,
    routed: AtomicUsize,
}

impl SessionRouter for RequeueingSession {
    fn route_packet(&self, _packet: PacketPtr, _current_time: Duration) -> Result<()> {
        if let Some(inbound) = self.inbound.lock().take() {
            inbound.write(report(99, 0))?;
        }
        self.routed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn dest() -> SocketAddr {
    "127.0.0.1:20000".parse().unwrap()
}

struct Fixture {
    tracker: Arc<StateTracker>,
    session: Arc<RecordingSession>,
    writer: Arc<RecordingWriter>,
    arena: Arc<HeapArena>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_session(RecordingSession::default())
    }

    fn with_session(session: RecordingSession) -> Self {
        Self {
            tracker: Arc::new(StateTracker::new()),
            session: Arc::new(session),
            writer: Arc::new(RecordingWriter::default()),
            arena: Arc::new(HeapArena::new()),
        }
    }

    fn session_ref(&self) -> Weak<dyn SessionRouter> {
        let weak: Weak<RecordingSession> = Arc::downgrade(&self.session);
        weak
    }

    fn endpoint(&self, proto: Protocol) -> SenderEndpoint {
        SenderEndpoint::new(
            proto,
            self.tracker.clone(),
            self.session_ref(),
            dest(),
            self.writer.clone(),
            self.arena.clone(),
        )
    }

    fn endpoint_with_arena(&self, proto: Protocol, arena: Arc<dyn Arena>) -> SenderEndpoint {
        SenderEndpoint::new(
            proto,
            self.tracker.clone(),
            self.session_ref(),
            dest(),
            self.writer.clone(),
            arena,
        )
    }
}

fn report(ssrc: u32, packet_count: u32) -> PacketPtr {
    let bytes = SenderReport {
        ssrc,
        packet_count,
        ..SenderReport::default()
    }
    .serialize();
    Arc::new(Packet::from_bytes(bytes))
}

fn garbage(tag: u8) -> PacketPtr {
    Arc::new(Packet::from_bytes(vec![0xde, 0xad, tag]))
}

fn media_packet(endpoint: &SenderEndpoint, sequencer: &mut RtpSequencer) -> PacketPtr {
    let mut packet = Packet::new();
    packet.rtp = Some(sequencer.next_meta(false));
    if let Some(scheme) = endpoint.proto().fec_scheme() {
        packet.fec = Some(FecMeta::new(scheme));
    }
    endpoint.composer().unwrap().prepare(&mut packet, 160).unwrap();
    sequencer.advance_timestamp(160);
    Arc::new(packet)
}

fn sent_seqnums(writer: &RecordingWriter) -> Vec<u16> {
    writer
        .packets
        .lock()
        .iter()
        .map(|p| u16::from_be_bytes([p.buffer()[2], p.buffer()[3]]))
        .collect()
}

#[test]
fn every_supported_protocol_builds_a_valid_endpoint() {
    let fx = Fixture::new();
    for proto in Protocol::SUPPORTED {
        let endpoint = fx.endpoint(proto);
        assert!(endpoint.is_valid(), "{proto} endpoint invalid");
        assert!(endpoint.init_error().is_none());
        assert_eq!(endpoint.proto(), proto);
        assert!(endpoint.composer().is_some());
        for _ in 0..3 {
            assert!(endpoint.is_valid());
        }
    }
    assert_eq!(fx.arena.allocated(), 0);
}

#[test]
fn unset_protocol_yields_invalid_endpoint() {
    let fx = Fixture::new();
    let mut endpoint = fx.endpoint(Protocol::None);

    assert!(!endpoint.is_valid());
    assert!(matches!(
        endpoint.init_error(),
        Some(SendError::UnsupportedProtocol(Protocol::None))
    ));
    assert!(endpoint.composer().is_none());
    assert!(endpoint.inbound_writer().is_none());
    assert!(matches!(
        endpoint.outbound_writer().write(Arc::new(Packet::new())),
        Err(SendError::InvalidEndpoint)
    ));
    assert!(matches!(
        endpoint.pull_packets(Duration::ZERO),
        Err(SendError::InvalidEndpoint)
    ));
    assert!(!endpoint.is_valid());
}

#[test]
fn inbound_writer_exists_only_for_control_protocols() {
    let fx = Fixture::new();
    for proto in Protocol::SUPPORTED {
        let endpoint = fx.endpoint(proto);
        match endpoint.inbound_writer() {
            Some(first) => {
                assert!(proto.has_control(), "{proto} has an inbound writer");
                let second = endpoint.inbound_writer().unwrap();
                assert!(std::ptr::addr_eq(Arc::as_ptr(&first), Arc::as_ptr(&second)));
            }
            None => assert!(!proto.has_control(), "{proto} lacks an inbound writer"),
        }
    }
}

#[test]
fn outbound_packets_keep_order_and_get_addressed() {
    let fx = Fixture::new();
    let endpoint = fx.endpoint(Protocol::Rtp);
    let mut sequencer = RtpSequencer::new(11, 0xCAFE);

    let p1 = media_packet(&endpoint, &mut sequencer);
    let p2 = media_packet(&endpoint, &mut sequencer);
    endpoint.outbound_writer().write(p1).unwrap();
    endpoint.outbound_writer().write(p2).unwrap();

    assert_eq!(sent_seqnums(&fx.writer), vec![0, 1]);
    for packet in fx.writer.packets.lock().iter() {
        assert_eq!(packet.dst_addr(), Some(dest()));
        assert!(packet.has_flags(FLAG_UDP | FLAG_COMPOSED));
        assert_eq!(packet.len(), 12 + 160);
    }
}

#[test]
fn fec_source_endpoint_appends_payload_id() {
    let fx = Fixture::new();
    let endpoint = fx.endpoint(Protocol::RtpLdpcSource);
    let mut sequencer = RtpSequencer::new(11, 1);

    let mut packet = Packet::new();
    packet.rtp = Some(sequencer.next_meta(true));
    packet.fec = Some(FecMeta {
        source_block_number: 3,
        encoding_symbol_id: 1,
        source_block_length: 4,
        block_length: 6,
        ..FecMeta::new(FecScheme::LdpcStaircase)
    });
    endpoint.composer().unwrap().prepare(&mut packet, 20).unwrap();
    endpoint.outbound_writer().write(Arc::new(packet)).unwrap();

    let sent = fx.writer.packets.lock();
    let buf = sent[0].buffer();
    assert_eq!(buf.len(), 12 + 20 + 8);
    assert_eq!(buf[1] & 0x80, 0x80);
    assert_eq!(&buf[32..], &[0, 3, 0, 1, 0, 4, 0, 6]);
}

#[test]
fn transport_failure_is_returned_unchanged() {
    let fx = Fixture::new();
    let endpoint = SenderEndpoint::new(
        Protocol::Rtp,
        fx.tracker.clone(),
        fx.session_ref(),
        dest(),
        Arc::new(RefusingWriter),
        fx.arena.clone(),
    );
    let mut sequencer = RtpSequencer::new(11, 1);

    let err = endpoint
        .outbound_writer()
        .write(media_packet(&endpoint, &mut sequencer))
        .unwrap_err();
    assert!(matches!(err, SendError::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionRefused));
    assert!(err.is_fatal());
}

#[test]
fn oversized_packet_is_refused_at_prepare() {
    let fx = Fixture::new();
    let endpoint = SenderEndpoint::with_config(
        EndpointConfig {
            max_packet_size: 200,
        },
        Protocol::RtpRs8mSource,
        fx.tracker.clone(),
        fx.session_ref(),
        dest(),
        fx.writer.clone(),
        fx.arena.clone(),
    );

    let composer = endpoint.composer().unwrap();
    assert!(composer.prepare(&mut Packet::new(), 180).is_ok());
    assert!(matches!(
        composer.prepare(&mut Packet::new(), 181),
        Err(SendError::PacketTooLarge { size: 201, max: 200 })
    ));
}

#[test]
fn fec_allocation_failure_invalidates_endpoint() {
    let fx = Fixture::new();
    // Allocation 1 is the RTP composer, allocation 2 the FEC composer.
    let arena = Arc::new(FailingArena::new(2));
    let mut endpoint = fx.endpoint_with_arena(Protocol::RtpRs8mSource, arena.clone());

    assert!(!endpoint.is_valid());
    assert!(matches!(
        endpoint.init_error(),
        Some(SendError::NoMem {
            what: "fec composer"
        })
    ));
    assert!(endpoint.composer().is_none());
    assert!(endpoint.inbound_writer().is_none());
    assert!(endpoint.pull_packets(Duration::ZERO).is_err());
    assert_eq!(arena.allocated.load(Ordering::SeqCst), 0);
}

#[test]
fn repair_allocation_failure_invalidates_endpoint() {
    let fx = Fixture::new();
    let arena = Arc::new(FailingArena::new(1));
    let endpoint = fx.endpoint_with_arena(Protocol::LdpcRepair, arena.clone());

    assert!(!endpoint.is_valid());
    assert!(endpoint.composer().is_none());
}

#[test]
fn parser_allocation_failure_leaves_no_inbound_writer() {
    let fx = Fixture::new();
    // RTCP composer, then RTCP parser.
    let arena = Arc::new(FailingArena::new(2));
    let endpoint = fx.endpoint_with_arena(Protocol::Rtcp, arena.clone());

    assert!(!endpoint.is_valid());
    assert!(endpoint.inbound_writer().is_none());
    assert_eq!(arena.allocated.load(Ordering::SeqCst), 0);
}

#[test]
fn shipper_allocation_failure_invalidates_endpoint() {
    // The shipper is the last allocation: after the RTP composer, the FEC
    // composer, or the RTCP composer and parser.
    for (proto, fail_on) in [
        (Protocol::Rtp, 2),
        (Protocol::RtpRs8mSource, 3),
        (Protocol::Rtcp, 3),
    ] {
        let fx = Fixture::new();
        let arena = Arc::new(FailingArena::new(fail_on));
        let endpoint = fx.endpoint_with_arena(proto, arena.clone());

        assert!(!endpoint.is_valid(), "{proto} endpoint valid");
        assert!(matches!(
            endpoint.init_error(),
            Some(SendError::NoMem { what: "shipper" })
        ));
        assert!(endpoint.inbound_writer().is_none());
        assert_eq!(arena.allocated.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn rtcp_composer_allocation_failure_invalidates_endpoint() {
    let fx = Fixture::new();
    let arena = Arc::new(FailingArena::new(1));
    let endpoint = fx.endpoint_with_arena(Protocol::Rtcp, arena.clone());

    assert!(!endpoint.is_valid());
    assert!(matches!(
        endpoint.init_error(),
        Some(SendError::NoMem {
            what: "rtcp composer"
        })
    ));
    assert!(endpoint.composer().is_none());
    assert!(endpoint.inbound_writer().is_none());
}

#[test]
fn bad_padding_is_reported_not_shipped() {
    let fx = Fixture::new();
    let endpoint = fx.endpoint(Protocol::Rtp);
    let composer = endpoint.composer().unwrap();

    // Larger than the payload, and larger than the one-byte pad count.
    for (payload_size, padding) in [(4, 20), (400, 300)] {
        let mut packet = Packet::new();
        packet.rtp = Some(RtpSequencer::new(11, 1).next_meta(false));
        composer.prepare(&mut packet, payload_size).unwrap();
        packet.rtp.as_mut().unwrap().padding = padding;

        let err = endpoint.outbound_writer().write(Arc::new(packet)).unwrap_err();
        assert!(matches!(err, SendError::BadLayout(_)));
    }
    assert!(fx.writer.packets.lock().is_empty());
}

#[test]
fn malformed_feedback_does_not_fail_the_batch() {
    let fx = Fixture::new();
    let mut endpoint = fx.endpoint(Protocol::Rtcp);
    let inbound = endpoint.inbound_writer().unwrap();

    let a = inbound.clone();
    let b = inbound.clone();
    let t1 = thread::spawn(move || {
        a.write(garbage(1)).unwrap();
        a.write(report(1, 0)).unwrap();
        a.write(garbage(2)).unwrap();
    });
    let t2 = thread::spawn(move || {
        b.write(garbage(3)).unwrap();
        b.write(report(2, 0)).unwrap();
    });
    t1.join().unwrap();
    t2.join().unwrap();
    assert_eq!(fx.tracker.num_pending_packets(), 5);

    endpoint.pull_packets(Duration::from_millis(10)).unwrap();

    assert_eq!(
        endpoint.stats(),
        EndpointStats {
            drained: 5,
            parsed: 2,
            routed: 2,
            parse_failures: 3,
        }
    );
    let routed = fx.session.routed.lock();
    assert_eq!(routed.len(), 2);
    assert!(routed.iter().all(|p| p.has_flags(FLAG_RTCP | FLAG_PARSED)));
    assert_eq!(fx.tracker.num_pending_packets(), 0);
}

#[test]
fn media_only_endpoint_pull_is_a_noop() {
    let fx = Fixture::new();
    let mut endpoint = fx.endpoint(Protocol::Rtp);

    assert!(endpoint.inbound_writer().is_none());
    for _ in 0..3 {
        endpoint.pull_packets(Duration::ZERO).unwrap();
    }
    assert_eq!(endpoint.stats(), EndpointStats::default());
    assert!(fx.session.routed.lock().is_empty());
}

#[test]
fn concurrent_producers_are_drained_completely_in_producer_order() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 100;

    let fx = Fixture::new();
    let mut endpoint = fx.endpoint(Protocol::Rtcp);

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let inbound = endpoint.inbound_writer().unwrap();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    inbound.write(report(producer, seq)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    endpoint.pull_packets(Duration::ZERO).unwrap();

    let routed = fx.session.routed.lock();
    assert_eq!(routed.len(), (PRODUCERS * PER_PRODUCER) as usize);

    let mut next = vec![0u32; PRODUCERS as usize];
    for packet in routed.iter() {
        let buf = packet.buffer();
        let producer = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        let seq = u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]);
        assert_eq!(seq, next[producer], "producer {producer} out of order");
        next[producer] += 1;
    }
    assert!(next.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn routing_failure_stops_the_batch() {
    let fx = Fixture::with_session(RecordingSession {
        fail_after: Some(1),
        ..RecordingSession::default()
    });
    let mut endpoint = fx.endpoint(Protocol::Rtcp);
    let inbound = endpoint.inbound_writer().unwrap();
    for i in 0..3 {
        inbound.write(report(i, 0)).unwrap();
    }

    let err = endpoint.pull_packets(Duration::ZERO).unwrap_err();
    assert!(matches!(err, SendError::Aborted(_)));
    assert!(err.is_fatal());

    assert_eq!(fx.session.routed.lock().len(), 1);
    assert_eq!(endpoint.stats().drained, 2);
    assert_eq!(endpoint.stats().routed, 1);
    assert_eq!(fx.tracker.num_pending_packets(), 1);
}

#[test]
fn packets_queued_during_a_pull_wait_for_the_next_one() {
    let fx = Fixture::new();
    let session = Arc::new(RequeueingSession::default());
    let session_ref: Weak<RequeueingSession> = Arc::downgrade(&session);
    let mut endpoint = SenderEndpoint::new(
        Protocol::Rtcp,
        fx.tracker.clone(),
        session_ref,
        dest(),
        fx.writer.clone(),
        fx.arena.clone(),
    );
    let inbound = endpoint.inbound_writer().unwrap();
    *session.inbound.lock() = Some(inbound.clone());
    inbound.write(report(1, 0)).unwrap();

    endpoint.pull_packets(Duration::ZERO).unwrap();
    assert_eq!(endpoint.stats().drained, 1);
    assert_eq!(session.routed.load(Ordering::SeqCst), 1);
    assert_eq!(fx.tracker.num_pending_packets(), 1);

    endpoint.pull_packets(Duration::ZERO).unwrap();
    assert_eq!(endpoint.stats().drained, 2);
    assert_eq!(session.routed.load(Ordering::SeqCst), 2);
    assert_eq!(fx.tracker.num_pending_packets(), 0);
}

#[test]
fn dropped_session_is_reported() {
    let fx = Fixture::new();
    let mut endpoint = fx.endpoint(Protocol::Rtcp);
    let Fixture {
        session, tracker, ..
    } = fx;

    endpoint.pull_packets(Duration::ZERO).unwrap();

    endpoint.inbound_writer().unwrap().write(report(1, 0)).unwrap();
    drop(session);

    assert!(matches!(
        endpoint.pull_packets(Duration::ZERO),
        Err(SendError::SessionGone)
    ));
    assert_eq!(tracker.num_pending_packets(), 1);
}

#[test]
fn dropping_endpoint_releases_pending_packets() {
    let fx = Fixture::new();
    let endpoint = fx.endpoint(Protocol::Rtcp);
    let inbound = endpoint.inbound_writer().unwrap();
    inbound.write(report(1, 0)).unwrap();
    drop(inbound);
    drop(endpoint);

    assert_eq!(fx.tracker.num_pending_packets(), 0);
    assert_eq!(fx.arena.allocated(), 0);
}
