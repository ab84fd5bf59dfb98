//! # Transport Adapter
//!
//! One TCP stream between the two endpoints.
//!
//! ## Threading
//!
//! - A reader thread blocks on the socket, decodes transport frames, stamps
//!   each with its arrival time and pushes it onto a bounded channel
//! - The owning tick drains that channel with `try_recv`; frames are never
//!   handled on the reader thread
//! - Sends happen on the tick thread through a mutex-guarded write half
//!
//! A closed or failed socket ends the session. There is no reconnect here;
//! that is the application's call.

mod framing;

pub use framing::{
    read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES, HEADER_SIZE, KIND_BINARY, KIND_TEXT,
};

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::clock::wall_clock_ms;
use crate::error::TransportError;
use crate::protocol::Frame;

/// Anything a flush can write frames into.
///
/// The socket transport implements it; tests use `Vec<Frame>`.
pub trait FrameSink {
    /// Sends one frame.
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;
}

impl FrameSink for Vec<Frame> {
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.push(frame);
        Ok(())
    }
}

/// Anything the tick can drain inbound events from without blocking.
pub trait FrameSource {
    /// Takes the next event, if one is waiting.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// One end of an in-process link. Frames sent on one end arrive, stamped,
/// at the other.
#[derive(Debug)]
pub struct MemoryLink {
    outbound: Sender<TransportEvent>,
    inbound: Receiver<TransportEvent>,
    closed: bool,
}

impl MemoryLink {
    /// Creates two connected ends.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, a_rx) = bounded(capacity);
        let (b_tx, b_rx) = bounded(capacity);
        (
            Self {
                outbound: a_tx,
                inbound: b_rx,
                closed: false,
            },
            Self {
                outbound: b_tx,
                inbound: a_rx,
                closed: false,
            },
        )
    }

    /// Tells the other end the link is gone.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.outbound.try_send(TransportEvent::Closed(None));
        }
    }
}

impl FrameSink for MemoryLink {
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(TransportEvent::Frame(InboundFrame::now(frame)))
            .map_err(|_| TransportError::Closed)
    }
}

impl FrameSource for MemoryLink {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        match self.inbound.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) if !self.closed => {
                self.closed = true;
                Some(TransportEvent::Closed(None))
            }
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// A frame as handed from the reader thread to the tick.
#[derive(Clone, Debug)]
pub struct InboundFrame {
    /// The frame.
    pub frame: Frame,
    /// Monotonic arrival time.
    pub queued_at: Instant,
    /// Wall-clock arrival time, Unix milliseconds.
    pub queued_at_ms: i64,
}

impl InboundFrame {
    /// Stamps a frame as arriving now.
    #[must_use]
    pub fn now(frame: Frame) -> Self {
        Self {
            frame,
            queued_at: Instant::now(),
            queued_at_ms: wall_clock_ms(),
        }
    }
}

/// Something the reader thread observed.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete frame.
    Frame(InboundFrame),
    /// The connection ended. Carries the reason if it was not a clean close.
    Closed(Option<String>),
}

/// Transport tuning.
#[derive(Clone, Copy, Debug)]
pub struct TransportConfig {
    /// Capacity of the reader → tick channel.
    pub inbound_queue_capacity: usize,
    /// Largest accepted frame payload.
    pub max_frame_bytes: usize,
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: 4096,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            nodelay: true,
        }
    }
}

/// Transport statistics, shared with the reader thread.
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Frames sent.
    pub frames_sent: AtomicU64,
    /// Frames received.
    pub frames_received: AtomicU64,
    /// Bytes sent, framing included.
    pub bytes_sent: AtomicU64,
    /// Bytes received, payload only.
    pub bytes_received: AtomicU64,
    /// Failed sends.
    pub send_errors: AtomicU64,
}

impl TransportStats {
    /// Frames sent so far.
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Frames received so far.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

/// A live connection to the peer endpoint.
pub struct BridgeTransport {
    /// Write half.
    writer: Arc<Mutex<TcpStream>>,
    /// Frames from the reader thread.
    receiver: Receiver<TransportEvent>,
    /// Cleared when either side closes.
    running: Arc<AtomicBool>,
    /// Counters.
    stats: Arc<TransportStats>,
    /// Peer address.
    peer: SocketAddr,
    /// Reader thread.
    reader: Option<JoinHandle<()>>,
}

impl BridgeTransport {
    /// Connects to a listening endpoint.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, config)
    }

    /// Wraps an established stream and starts its reader thread.
    pub fn from_stream(stream: TcpStream, config: TransportConfig) -> Result<Self, TransportError> {
        stream.set_nodelay(config.nodelay)?;
        let peer = stream.peer_addr()?;
        let read_half = stream.try_clone()?;

        let (sender, receiver) = bounded(config.inbound_queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(TransportStats::default());

        let reader = {
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name(format!("tether-reader-{peer}"))
                .spawn(move || {
                    reader_loop(read_half, &sender, &running, &stats, config.max_frame_bytes);
                })?
        };

        tracing::debug!(target: "tether::session", %peer, "transport connected");

        Ok(Self {
            writer: Arc::new(Mutex::new(stream)),
            receiver,
            running,
            stats,
            peer,
            reader: Some(reader),
        })
    }

    /// Sends one frame.
    pub fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut stream = self.writer.lock();
        match write_frame(&mut *stream, frame) {
            Ok(written) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                self.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Takes the next event without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<TransportEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(TransportEvent::Closed(None)),
        }
    }

    /// Waits up to `timeout` for the next event.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TransportEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(TransportEvent::Closed(None)),
        }
    }

    /// True until either side closes.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Peer address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Shared statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Closes the socket and joins the reader thread.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.writer.lock().shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl FrameSink for BridgeTransport {
    fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.send(&frame)
    }
}

impl FrameSource for BridgeTransport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.reader.is_none() {
            return None;
        }
        let event = self.try_recv();
        if matches!(event, Some(TransportEvent::Closed(_))) {
            // Report the close once.
            self.running.store(false, Ordering::SeqCst);
            if let Some(reader) = self.reader.take() {
                let _ = reader.join();
            }
        }
        event
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BridgeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeTransport")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn reader_loop(
    stream: TcpStream,
    sender: &Sender<TransportEvent>,
    running: &AtomicBool,
    stats: &TransportStats,
    max_frame_bytes: usize,
) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_frame(&mut reader, max_frame_bytes) {
            Ok(frame) => {
                stats.frames_received.fetch_add(1, Ordering::Relaxed);
                stats
                    .bytes_received
                    .fetch_add(frame.len() as u64, Ordering::Relaxed);
                if sender
                    .send(TransportEvent::Frame(InboundFrame::now(frame)))
                    .is_err()
                {
                    break;
                }
            }
            Err(err) => {
                let was_running = running.swap(false, Ordering::SeqCst);
                if was_running {
                    let reason = match err {
                        TransportError::Closed => None,
                        other => Some(other.to_string()),
                    };
                    let _ = sender.send(TransportEvent::Closed(reason));
                }
                break;
            }
        }
    }
}

/// Listening side of the bridge.
#[derive(Debug)]
pub struct BridgeListener {
    listener: TcpListener,
    config: TransportConfig,
}

impl BridgeListener {
    /// Binds a listener.
    pub fn bind<A: ToSocketAddrs>(addr: A, config: TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            config,
        })
    }

    /// Bound address (useful after binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Blocks until a peer connects.
    pub fn accept(&self) -> Result<BridgeTransport, TransportError> {
        let (stream, _) = self.listener.accept()?;
        BridgeTransport::from_stream(stream, self.config)
    }
}
