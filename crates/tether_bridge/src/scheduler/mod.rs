//! # Deferred Message Scheduler
//!
//! Turns bursty per-object traffic into bounded-rate frames.
//!
//! ## Queues
//!
//! | Queue    | Holds                               | Flush                         |
//! |----------|-------------------------------------|-------------------------------|
//! | Commands | per-handle FIFO of `{cmd, args}`     | every 45ms, or on expedite    |
//! | Geometry | latest merged update per handle     | every 90ms, or on expedite    |
//!
//! A command flush with several messages goes out as one timestamped
//! bundle; a single message goes out bare. A geometry flush sends explicit
//! updates first, then the deltas pulled from live objects, as one binary
//! frame.
//!
//! Both queues are swapped out before the frame is composed, so anything
//! enqueued while a flush is in progress lands in the next one.

mod commands;
mod geometry;
mod throttle;

pub use commands::{CommandQueue, PendingMessage};
pub use geometry::GeometryQueue;
pub use throttle::FlushTimer;

use std::time::{Duration, Instant};

use tether_shared::ObjectHandle;

use crate::error::{BridgeResult, TransportError};
use crate::protocol::geometry::MAX_RECORD_BYTES;
use crate::protocol::{
    encode_bundle, encode_geometry_frame, Arg, ByteWriter, Frame, GeometryRecord, GeometryUpdate,
};
use crate::transport::FrameSink;

/// Scheduler tuning.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Minimum time between command flushes.
    pub message_interval: Duration,
    /// Minimum time between geometry flushes.
    pub geometry_interval: Duration,
    /// Bound on pending commands; zero for unbounded.
    pub max_pending_messages: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            message_interval: Duration::from_millis(tether_shared::MESSAGE_FLUSH_INTERVAL_MS),
            geometry_interval: Duration::from_millis(tether_shared::GEOMETRY_FLUSH_INTERVAL_MS),
            max_pending_messages: 0,
        }
    }
}

/// What one command flush sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageFlush {
    /// Commands sent.
    pub messages: usize,
    /// True if they went out as a bundle.
    pub bundled: bool,
}

/// Both deferred queues and their throttles.
#[derive(Debug)]
pub struct DeferredScheduler {
    commands: CommandQueue,
    geometry: GeometryQueue,
    message_timer: FlushTimer,
    geometry_timer: FlushTimer,
    writer: ByteWriter,
}

impl DeferredScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            commands: CommandQueue::with_limit(config.max_pending_messages),
            geometry: GeometryQueue::new(),
            message_timer: FlushTimer::new(config.message_interval),
            geometry_timer: FlushTimer::new(config.geometry_interval),
            writer: ByteWriter::with_capacity(64 * MAX_RECORD_BYTES),
        }
    }

    /// Defers a command addressed to `handle`.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the queue is bounded and full.
    pub fn enqueue(
        &mut self,
        handle: ObjectHandle,
        command: impl Into<String>,
        args: Vec<Arg>,
    ) -> BridgeResult<()> {
        self.commands
            .enqueue(handle, PendingMessage::new(command, args))
    }

    /// Records an explicit geometry update for the next geometry flush.
    pub fn enqueue_geometry(&mut self, handle: ObjectHandle, update: &GeometryUpdate) {
        self.geometry.record(handle, update);
    }

    /// Makes the next command flush happen on the next poll.
    pub fn expedite_message_flush(&mut self) {
        self.message_timer.expedite();
    }

    /// Makes the next geometry flush happen on the next poll.
    pub fn expedite_geometry_flush(&mut self) {
        self.geometry_timer.expedite();
    }

    /// Expedites both queues.
    pub fn expedite_flush(&mut self) {
        self.expedite_message_flush();
        self.expedite_geometry_flush();
    }

    /// Drops everything pending for `handle` in both queues.
    pub fn purge(&mut self, handle: ObjectHandle) -> usize {
        self.commands.purge(handle) + usize::from(self.geometry.purge(handle))
    }

    /// Drops everything pending.
    pub fn clear(&mut self) {
        let _ = self.commands.take();
        let _ = self.geometry.take();
    }

    /// Pending commands.
    #[must_use]
    pub const fn pending_messages(&self) -> usize {
        self.commands.len()
    }

    /// Handles with a pending explicit geometry update.
    #[must_use]
    pub fn pending_geometry(&self) -> usize {
        self.geometry.len()
    }

    /// The command queue.
    #[must_use]
    pub const fn commands(&self) -> &CommandQueue {
        &self.commands
    }

    /// The explicit geometry queue.
    #[must_use]
    pub const fn geometry(&self) -> &GeometryQueue {
        &self.geometry
    }

    /// Composes the pending commands into a frame, emptying the queue.
    ///
    /// `None` if nothing is pending.
    pub fn compose_messages(&mut self, timestamp: i64) -> Option<(Frame, MessageFlush)> {
        let messages: Vec<String> = self
            .commands
            .take()
            .into_iter()
            .flat_map(|(_, pending)| pending)
            .map(|message| message.encode())
            .collect();

        match messages.len() {
            0 => None,
            1 => {
                let frame = messages.into_iter().next().map(Frame::Text)?;
                Some((
                    frame,
                    MessageFlush {
                        messages: 1,
                        bundled: false,
                    },
                ))
            }
            n => Some((
                Frame::Text(encode_bundle(timestamp, &messages)),
                MessageFlush {
                    messages: n,
                    bundled: true,
                },
            )),
        }
    }

    /// Flushes commands if the throttle allows.
    pub fn poll_messages<S: FrameSink + ?Sized>(
        &mut self,
        now: Instant,
        timestamp: i64,
        sink: &mut S,
    ) -> Result<Option<MessageFlush>, TransportError> {
        if !self.message_timer.poll(now) {
            return Ok(None);
        }
        match self.compose_messages(timestamp) {
            Some((frame, flush)) => {
                sink.send_frame(frame)?;
                Ok(Some(flush))
            }
            None => Ok(None),
        }
    }

    /// Composes a geometry frame from the explicit queue followed by
    /// `pulled`, emptying the queue. `None` if there is nothing to send.
    pub fn compose_geometry<I>(&mut self, timestamp: i64, pulled: I) -> Option<(Frame, usize)>
    where
        I: IntoIterator<Item = GeometryRecord>,
    {
        let mut records = self.geometry.take();
        records.extend(pulled.into_iter().filter(|r| !r.update.is_empty()));
        if records.is_empty() {
            return None;
        }
        let written = encode_geometry_frame(&mut self.writer, timestamp, &records);
        if written == 0 {
            return None;
        }
        Some((Frame::Binary(self.writer.as_slice().to_vec()), written))
    }

    /// Flushes geometry if the throttle allows. `pull` runs only when a
    /// flush is due, so unchanged objects cost nothing between flushes.
    pub fn poll_geometry<S, F, I>(
        &mut self,
        now: Instant,
        timestamp: i64,
        pull: F,
        sink: &mut S,
    ) -> Result<Option<usize>, TransportError>
    where
        S: FrameSink + ?Sized,
        F: FnOnce() -> I,
        I: IntoIterator<Item = GeometryRecord>,
    {
        if !self.geometry_timer.poll(now) {
            return Ok(None);
        }
        match self.compose_geometry(timestamp, pull()) {
            Some((frame, records)) => {
                sink.send_frame(frame)?;
                Ok(Some(records))
            }
            None => Ok(None),
        }
    }
}

impl Default for DeferredScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
