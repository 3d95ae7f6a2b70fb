use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use sendpipe::media::RtpSequencer;
use sendpipe::packet::FecMeta;
use sendpipe::rtcp::{SenderReport, report::ntp_timestamp};
use sendpipe::{
    Composer, HeapArena, Packet, PacketPtr, PacketWriter, Protocol, Result, SendError,
    SenderEndpoint, SessionRouter, StateTracker, UdpTransport,
};

/// RTP payload type for the test stream (dynamic range).
const PAYLOAD_TYPE: u8 = 96;
/// Source packets per FEC block.
const FEC_SOURCE_BLOCK: u32 = 20;
/// Source plus repair packets per FEC block.
const FEC_BLOCK: u32 = 30;
/// Frames between two RTCP sender reports.
const REPORT_INTERVAL: u32 = 100;

#[derive(Clone, Copy, ValueEnum)]
enum Fec {
    None,
    Rs8m,
    Ldpc,
}

#[derive(Parser)]
#[command(
    name = "sendpipe",
    about = "Send an RTP test pattern through sender endpoints"
)]
struct Args {
    /// Local bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:0")]
    source: SocketAddr,

    /// Destination for media packets (host:port)
    #[arg(long, short)]
    dest: SocketAddr,

    /// Destination for RTCP; enables the control endpoint
    #[arg(long)]
    control_dest: Option<SocketAddr>,

    /// FEC scheme for source packet framing
    #[arg(long, value_enum, default_value_t = Fec::None)]
    fec: Fec,

    /// Media payload bytes per packet
    #[arg(long, default_value_t = 320)]
    payload_size: usize,

    /// Number of media packets to send
    #[arg(long, default_value_t = 500)]
    frames: u32,

    /// Delay between media packets in milliseconds
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,
}

/// Session side of the control endpoint: logs receiver feedback.
#[derive(Default)]
struct FeedbackLog {
    reports: AtomicU64,
}

impl SessionRouter for FeedbackLog {
    fn route_packet(&self, packet: PacketPtr, current_time: Duration) -> Result<()> {
        let src = packet.udp.as_ref().and_then(|udp| udp.src_addr);
        let blocks = packet.rtcp.as_ref().map_or(0, |rtcp| rtcp.blocks.len());
        let total = self.reports.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(?src, blocks, total, at = ?current_time, "feedback received");
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("sendpipe: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let transport = UdpTransport::bind_addr(args.source)?;
    let tracker = Arc::new(StateTracker::new());
    let arena = Arc::new(HeapArena::new());
    let session = Arc::new(FeedbackLog::default());
    let session_ref: Weak<FeedbackLog> = Arc::downgrade(&session);
    let session_ref: Weak<dyn SessionRouter> = session_ref;

    let media_proto = match args.fec {
        Fec::None => Protocol::Rtp,
        Fec::Rs8m => Protocol::RtpRs8mSource,
        Fec::Ldpc => Protocol::RtpLdpcSource,
    };

    let media = SenderEndpoint::new(
        media_proto,
        tracker.clone(),
        session_ref.clone(),
        args.dest,
        Arc::new(transport.clone()),
        arena.clone(),
    );
    if let Some(e) = media.init_error() {
        return Err(SendError::Aborted(format!("media endpoint: {e}")));
    }

    let mut control = match args.control_dest {
        Some(addr) => {
            let endpoint = SenderEndpoint::new(
                Protocol::Rtcp,
                tracker.clone(),
                session_ref,
                addr,
                Arc::new(transport.clone()),
                arena.clone(),
            );
            if let Some(e) = endpoint.init_error() {
                return Err(SendError::Aborted(format!("control endpoint: {e}")));
            }
            Some(endpoint)
        }
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let netio = control
        .as_ref()
        .and_then(|endpoint| endpoint.inbound_writer())
        .map(|inbound| spawn_netio(transport.clone(), inbound, running.clone()))
        .transpose()?;

    tracker.add_active_sessions(1);
    tracing::info!(
        local = %transport.local_addr()?,
        dest = %args.dest,
        proto = %media_proto,
        control = ?args.control_dest,
        "sending"
    );

    let result = pipeline_loop(args, &media, control.as_mut());

    tracker.add_active_sessions(-1);
    running.store(false, Ordering::SeqCst);
    if let Some(handle) = netio {
        if handle.join().is_err() {
            tracing::warn!("network thread panicked");
        }
    }

    if let Some(endpoint) = &control {
        tracing::info!(stats = ?endpoint.stats(), "control endpoint finished");
    }
    result
}

/// Pipeline thread: compose and ship media, report, and pull feedback.
fn pipeline_loop(
    args: &Args,
    media: &SenderEndpoint,
    mut control: Option<&mut SenderEndpoint>,
) -> Result<()> {
    let composer = media.composer().ok_or(SendError::InvalidEndpoint)?;
    let mut sequencer = RtpSequencer::with_random_ssrc(PAYLOAD_TYPE);
    let started = Instant::now();
    let mut octets: u32 = 0;

    for frame in 0..args.frames {
        let mut packet = Packet::new();
        packet.rtp = Some(sequencer.next_meta(frame == 0));
        if let Some(scheme) = media.proto().fec_scheme() {
            packet.fec = Some(FecMeta {
                source_block_number: frame / FEC_SOURCE_BLOCK,
                encoding_symbol_id: frame % FEC_SOURCE_BLOCK,
                source_block_length: FEC_SOURCE_BLOCK,
                block_length: FEC_BLOCK,
                ..FecMeta::new(scheme)
            });
        }
        composer.prepare(&mut packet, args.payload_size)?;
        fill_pattern(packet.payload_mut(), frame);

        media.outbound_writer().write(Arc::new(packet))?;
        sequencer.advance_timestamp(args.payload_size as u32);
        octets = octets.wrapping_add(args.payload_size as u32);

        if let Some(endpoint) = control.as_deref_mut() {
            if frame % REPORT_INTERVAL == 0 {
                send_report(endpoint, &sequencer, frame + 1, octets)?;
            }
            endpoint.pull_packets(started.elapsed())?;
        }

        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    tracing::info!(frames = args.frames, elapsed = ?started.elapsed(), "done");
    Ok(())
}

fn send_report(
    endpoint: &SenderEndpoint,
    sequencer: &RtpSequencer,
    packet_count: u32,
    octet_count: u32,
) -> Result<()> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let report = SenderReport {
        ssrc: sequencer.ssrc,
        ntp_timestamp: ntp_timestamp(since_epoch),
        rtp_timestamp: sequencer.timestamp() as u32,
        packet_count,
        octet_count,
        cname: Some(format!("sendpipe-{:08x}", sequencer.ssrc)),
    }
    .serialize();

    let composer = endpoint.composer().ok_or(SendError::InvalidEndpoint)?;
    let mut packet = Packet::new();
    composer.prepare(&mut packet, report.len())?;
    packet.payload_mut().copy_from_slice(&report);
    endpoint.outbound_writer().write(Arc::new(packet))
}

/// Network thread: feed datagrams from the socket into the inbound writer.
fn spawn_netio(
    transport: UdpTransport,
    inbound: Arc<dyn PacketWriter>,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    transport.set_read_timeout(Some(Duration::from_millis(100)))?;

    Ok(thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            match transport.recv_packet() {
                Ok(packet) => {
                    if let Err(e) = inbound.write(Arc::new(packet)) {
                        tracing::warn!(error = %e, "inbound queue rejected packet");
                    }
                }
                Err(SendError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "network receive failed");
                    break;
                }
            }
        }
        tracing::debug!("network thread exited");
    }))
}

/// Deterministic byte ramp, shifted per frame.
fn fill_pattern(payload: &mut [u8], frame: u32) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = (frame as usize).wrapping_add(i) as u8;
    }
}
