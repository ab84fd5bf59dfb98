//! # Model Endpoint
//!
//! The simulation side of the bridge. Owns the pawns, allocates handles and
//! decides what the render side is told, and when.
//!
//! ## Tick
//!
//! ```text
//! pump()                          tick(now, virtual_time)
//!   │ drain inbound events          │ beacon (≤ 1/s)
//!   │ dispatch commands             │ stats report (≤ 1/s)
//!   ▼                               │ command flush (≤ 1/45ms)
//! pawns / input bus                 │ geometry flush (≤ 1/90ms), pulling
//!                                   ▼ deltas from ready spatial pawns
//!                                 link
//! ```
//!
//! ## Object Lifecycle
//!
//! 1. `register_pawn` allocates a handle. Commands and geometry sent for it
//!    now are held.
//! 2. `make_object` sends `makeObject`, then releases what was held, and
//!    expedites both queues.
//! 3. `objectCreated` marks the pawn view-ready (only waited for when the
//!    spec asks for confirmation). Geometry is pulled from ready pawns only.
//! 4. `destroy_object` drops the pawn, purges its pending traffic and sends
//!    `destroyObject`.

pub mod pawn;

pub use pawn::{EngineMoves, Pawn, SpatialPawn, SpatialTracker};

use std::sync::Arc;
use std::time::Instant;

use tether_shared::{EventBus, HandleAllocator, ObjectHandle};

use crate::clock::{beacon_arg, wall_clock_ms, BeaconSchedule};
use crate::config::BridgeConfig;
use crate::dispatch::{DispatchTable, Dispatched, FallbackHandler, Handler, HandlerClass};
use crate::error::{BridgeError, BridgeResult, DecodeError, TransportError};
use crate::input::parse_input_event;
use crate::logging::{tier_log, TierLogger};
use crate::object_spec::ObjectSpec;
use crate::protocol::commands::{
    DESTROY_OBJECT, EVENT, LOG, MAKE_OBJECT, MEASURE, OBJECT_CREATED, OBJECT_MOVED, PING, PONG,
    READY_FOR_SESSION, SESSION_RUNNING, SET_PARENT, SHUTDOWN, TEAR_DOWN_SESSION, TEATIME,
    UNPARENT,
};
use crate::protocol::{
    decode_frame, encode_command, parse_floats, parse_number, Arg, Command, Decoded, Frame,
    GeometryRecord, GeometryUpdate, TextFrame,
};
use crate::registry::{resolve_alias, ObjectRegistry};
use crate::scheduler::{DeferredScheduler, PendingMessage, SchedulerConfig};
use crate::session::{SessionCredentials, SessionState};
use crate::stats::{MessageStats, SetupStats};
use crate::transport::{FrameSink, FrameSource, InboundFrame, TransportEvent};

/// Model-side bookkeeping for one pawn.
struct PawnSlot {
    pawn: Box<dyn Pawn>,
    /// Commands sent before `make_object`. `None` once creation was requested.
    awaiting_creation: Option<Vec<PendingMessage>>,
    /// Latest geometry sent before `make_object`.
    geometry_awaiting: Option<GeometryUpdate>,
    /// The render side has the object and geometry may be pulled.
    view_ready: bool,
    /// Wall-clock time creation was requested.
    setup_started_ms: i64,
}

impl PawnSlot {
    const fn is_created(&self) -> bool {
        self.awaiting_creation.is_none()
    }
}

/// The simulation side of a bridge session, speaking over link `L`.
pub struct ModelBridge<L> {
    link: L,
    state: SessionState,
    credentials: Option<SessionCredentials>,
    handles: HandleAllocator,
    pawns: ObjectRegistry<PawnSlot>,
    scheduler: DeferredScheduler,
    beacon: BeaconSchedule,
    stats: MessageStats,
    setup_stats: SetupStats,
    logger: TierLogger,
    input: EventBus,
    table: Arc<DispatchTable<Self>>,
    fallback: Option<FallbackHandler>,
    last_round_trip_ms: Option<i64>,
    shutdown_requested: bool,
}

impl<L: FrameSink> ModelBridge<L> {
    /// Creates an endpoint waiting for `readyForSession` on `link`.
    #[must_use]
    pub fn new(link: L, config: &BridgeConfig) -> Self {
        Self {
            link,
            state: SessionState::AwaitingCredentials,
            credentials: None,
            handles: HandleAllocator::new(),
            pawns: ObjectRegistry::new(),
            scheduler: DeferredScheduler::new(SchedulerConfig {
                message_interval: config.message_flush_interval(),
                geometry_interval: config.geometry_flush_interval(),
                max_pending_messages: config.max_pending_messages,
            }),
            beacon: BeaconSchedule::new(config.beacon_interval()),
            stats: MessageStats::new(config.stats_interval()),
            setup_stats: SetupStats::new(),
            logger: TierLogger::new(config.log_options()),
            input: EventBus::new(),
            table: Arc::new(Self::command_table()),
            fallback: None,
            last_round_trip_ms: None,
            shutdown_requested: false,
        }
    }

    fn command_table() -> DispatchTable<Self> {
        let mut table = DispatchTable::new();
        table
            .register(READY_FOR_SESSION, HandlerClass::ClockDiagnostic, Self::on_ready_for_session)
            .register(OBJECT_CREATED, HandlerClass::Registry, Self::on_object_created)
            .register(OBJECT_MOVED, HandlerClass::Registry, Self::on_object_moved)
            .register(EVENT, HandlerClass::PassThrough, Self::on_event)
            .register(PONG, HandlerClass::ClockDiagnostic, Self::on_pong)
            .register(LOG, HandlerClass::ClockDiagnostic, Self::on_log)
            .register(MEASURE, HandlerClass::ClockDiagnostic, Self::on_measure)
            .register(SHUTDOWN, HandlerClass::ClockDiagnostic, Self::on_shutdown);
        table
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The triad from `readyForSession`, once seen.
    #[must_use]
    pub const fn credentials(&self) -> Option<&SessionCredentials> {
        self.credentials.as_ref()
    }

    /// Live pawns.
    #[must_use]
    pub fn pawn_count(&self) -> usize {
        self.pawns.len()
    }

    /// True if `handle` names a live pawn.
    #[must_use]
    pub fn has_pawn(&self, handle: ObjectHandle) -> bool {
        self.pawns.contains(handle)
    }

    /// True once the render side has confirmed `handle`.
    #[must_use]
    pub fn is_view_ready(&self, handle: ObjectHandle) -> bool {
        self.pawns.lookup(handle).is_some_and(|slot| slot.view_ready)
    }

    /// The deferred queues.
    #[must_use]
    pub const fn scheduler(&self) -> &DeferredScheduler {
        &self.scheduler
    }

    /// Input published from `event` commands.
    pub fn input_mut(&mut self) -> &mut EventBus {
        &mut self.input
    }

    /// Tier logger.
    pub fn logger_mut(&mut self) -> &mut TierLogger {
        &mut self.logger
    }

    /// The link.
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// The link, mutably.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Message counters for the current reporting interval.
    #[must_use]
    pub const fn stats(&self) -> &MessageStats {
        &self.stats
    }

    /// Last round trip measured by `ping`.
    #[must_use]
    pub const fn last_round_trip_ms(&self) -> Option<i64> {
        self.last_round_trip_ms
    }

    /// True once the render side sent `shutdown`.
    #[must_use]
    pub const fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Renders and clears the object setup-time histogram.
    pub fn take_setup_summary(&mut self) -> String {
        self.setup_stats.take_summary()
    }

    // ------------------------------------------------------------------
    // Extension points
    // ------------------------------------------------------------------

    /// Binds an application command.
    pub fn register_handler(&mut self, name: &'static str, handler: Handler<Self>) {
        Arc::make_mut(&mut self.table).register(name, HandlerClass::PassThrough, handler);
    }

    /// Sets the handler for commands nobody else claims.
    pub fn set_fallback(&mut self, fallback: FallbackHandler) {
        self.fallback = Some(fallback);
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Tells the render side the shared session is live.
    ///
    /// # Errors
    ///
    /// `SessionNotReady` before `readyForSession`; transport faults.
    pub fn announce_session_running(&mut self, view_id: &str) -> BridgeResult<()> {
        if !self.state.accepts_traffic() {
            return Err(BridgeError::SessionNotReady);
        }
        self.send_now(SESSION_RUNNING, &[Arg::from(view_id)])?;
        self.state = SessionState::Running;
        tier_log!(self.logger, Session, "session running as {view_id}");
        Ok(())
    }

    /// Sends `croquetPing`; the reply's round trip is logged.
    pub fn ping(&mut self) -> BridgeResult<()> {
        self.send_now(PING, &[Arg::from(wall_clock_ms())])
    }

    /// Sends one command immediately, bypassing the queues.
    pub fn send_now(&mut self, command: &str, args: &[Arg]) -> BridgeResult<()> {
        let frame = Frame::Text(encode_command(command, args));
        match self.link.send_frame(frame) {
            Ok(()) => {
                self.stats.outbound_frame(1);
                Ok(())
            }
            Err(err) => {
                self.on_transport_fault(&err);
                Err(err.into())
            }
        }
    }

    /// Says goodbye if still connected and closes the session.
    pub fn shutdown(&mut self) {
        if !self.state.is_closed() {
            let _ = self.send_now(TEAR_DOWN_SESSION, &[]);
        }
        self.close_session();
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Registers a pawn and allocates its handle. Nothing is sent until
    /// [`Self::make_object`].
    ///
    /// # Errors
    ///
    /// `HandlesExhausted` once the header's handle space is used up.
    pub fn register_pawn(&mut self, pawn: Box<dyn Pawn>) -> BridgeResult<ObjectHandle> {
        let handle = self.handles.allocate().ok_or(BridgeError::HandlesExhausted)?;
        self.pawns.insert(
            handle,
            PawnSlot {
                pawn,
                awaiting_creation: Some(Vec::new()),
                geometry_awaiting: None,
                view_ready: false,
                setup_started_ms: 0,
            },
        );
        Ok(handle)
    }

    /// Requests the render-side object for a registered pawn.
    ///
    /// The object spec's handle is overwritten with `handle` and the pawn's
    /// component names are appended.
    pub fn make_object(&mut self, handle: ObjectHandle, spec: ObjectSpec) -> BridgeResult<()> {
        let Some(slot) = self.pawns.lookup_mut(handle) else {
            tier_log!(self.logger, Debug, "make_object for absent pawn {handle}");
            return Ok(());
        };
        let Some(held) = slot.awaiting_creation.take() else {
            tier_log!(self.logger, Debug, "make_object repeated for {handle}");
            return Ok(());
        };

        let mut spec = spec.with_components(slot.pawn.component_names());
        spec.handle = handle;
        if !spec.confirm_creation {
            slot.view_ready = true;
        }
        slot.setup_started_ms = wall_clock_ms();
        let held_geometry = slot.geometry_awaiting.take();

        let json = spec.to_json()?;
        self.defer(handle, MAKE_OBJECT, vec![Arg::Text(json)])?;
        self.scheduler.expedite_flush();

        for message in held {
            let mut args = Vec::with_capacity(message.args.len() + 1);
            args.push(Arg::from(handle));
            args.extend(message.args);
            self.defer(handle, message.command, args)?;
        }
        if let Some(update) = held_geometry {
            self.scheduler.enqueue_geometry(handle, &update);
        }
        Ok(())
    }

    /// Registers `pawn` and requests its object in one step.
    pub fn create_object(&mut self, pawn: Box<dyn Pawn>, spec: ObjectSpec) -> BridgeResult<ObjectHandle> {
        let handle = self.register_pawn(pawn)?;
        self.make_object(handle, spec)?;
        Ok(handle)
    }

    /// Defers a command from a pawn, with its handle as first argument.
    /// Held until creation if the object was not requested yet.
    pub fn send_from_pawn(
        &mut self,
        handle: ObjectHandle,
        command: impl Into<String>,
        args: Vec<Arg>,
    ) -> BridgeResult<()> {
        let command = command.into();
        if let Some(held) = self
            .pawns
            .lookup_mut(handle)
            .and_then(|slot| slot.awaiting_creation.as_mut())
        {
            held.push(PendingMessage::new(command, args));
            return Ok(());
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Arg::from(handle));
        full.extend(args);
        self.defer(handle, command, full)
    }

    /// Records an explicit geometry update. Before creation only the latest
    /// one is kept.
    pub fn update_geometry(&mut self, handle: ObjectHandle, update: &GeometryUpdate) {
        if let Some(slot) = self.pawns.lookup_mut(handle) {
            if !slot.is_created() {
                slot.geometry_awaiting = Some(*update);
                return;
            }
        }
        self.scheduler.enqueue_geometry(handle, update);
    }

    /// Parents `child` under `parent` on the render side.
    pub fn set_parent(&mut self, child: ObjectHandle, parent: ObjectHandle) -> BridgeResult<()> {
        self.defer(child, SET_PARENT, vec![Arg::from(child), Arg::from(parent)])
    }

    /// Detaches `child` from its parent on the render side.
    pub fn unparent(&mut self, child: ObjectHandle) -> BridgeResult<()> {
        self.defer(child, UNPARENT, vec![Arg::from(child)])
    }

    /// Drops the pawn and purges whatever was still pending for it. The
    /// render side is told only if `make_object` had been requested.
    pub fn destroy_object(&mut self, handle: ObjectHandle) -> BridgeResult<()> {
        let announced = self.pawns.destroy(handle).is_some_and(|slot| slot.is_created());
        let purged = self.scheduler.purge(handle);
        tier_log!(self.logger, Verbose, "destroy {handle}: purged {purged} pending");
        if announced {
            self.defer(handle, DESTROY_OBJECT, vec![Arg::from(handle)])?;
        }
        Ok(())
    }

    fn defer(&mut self, handle: ObjectHandle, command: impl Into<String>, args: Vec<Arg>) -> BridgeResult<()> {
        let result = self.scheduler.enqueue(handle, command, args);
        if let Err(BridgeError::QueueFull { command, .. }) = &result {
            self.stats.dropped_message();
            tier_log!(self.logger, Info, "queue full, dropped {command} for {handle}");
        }
        result
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Beacons, reports stats and flushes whichever queues are due.
    /// Does nothing until the session is credentialed.
    pub fn tick(&mut self, now: Instant, virtual_time_ms: f64) -> BridgeResult<()> {
        if !self.state.accepts_traffic() {
            return Ok(());
        }

        if self.beacon.poll(now) {
            self.send_now(TEATIME, &[Arg::Text(beacon_arg(virtual_time_ms))])?;
        }
        if let Some(report) = self.stats.maybe_report(now) {
            if !report.is_idle() {
                tier_log!(self.logger, Diagnostics, "{report}");
            }
        }

        let timestamp = wall_clock_ms();
        let flushed = self.scheduler.poll_messages(now, timestamp, &mut self.link);
        match flushed {
            Ok(Some(flush)) => self.stats.outbound_frame(flush.messages),
            Ok(None) => {}
            Err(err) => {
                self.on_transport_fault(&err);
                return Err(err.into());
            }
        }

        let pawns = &mut self.pawns;
        let flushed = self.scheduler.poll_geometry(
            now,
            timestamp,
            || pull_geometry(pawns),
            &mut self.link,
        );
        match flushed {
            Ok(Some(records)) => self.stats.outbound_geometry(records),
            Ok(None) => {}
            Err(err) => {
                self.on_transport_fault(&err);
                return Err(err.into());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Drains every waiting inbound event. Returns how many were handled.
    pub fn pump(&mut self) -> usize
    where
        L: FrameSource,
    {
        let mut handled = 0;
        while let Some(event) = self.link.poll_event() {
            self.handle_event(event);
            handled += 1;
            if self.state.is_closed() {
                break;
            }
        }
        handled
    }

    /// Handles one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.handle_frame(&frame),
            TransportEvent::Closed(reason) => {
                tier_log!(
                    self.logger,
                    Session,
                    "render side disconnected{}",
                    reason.map(|r| format!(": {r}")).unwrap_or_default()
                );
                self.close_session();
            }
        }
    }

    /// Decodes and dispatches one inbound frame. Decode faults drop the
    /// frame.
    pub fn handle_frame(&mut self, inbound: &InboundFrame) {
        let start = Instant::now();
        match decode_frame(&inbound.frame) {
            Ok(Decoded::Text(TextFrame::Single(command))) => {
                self.stats.inbound_message();
                self.dispatch(&command);
            }
            Ok(Decoded::Text(TextFrame::Bundle { timestamp, commands })) => {
                self.stats.inbound_bundle(inbound.queued_at_ms.saturating_sub(timestamp));
                for command in &commands {
                    self.stats.inbound_message();
                    self.dispatch(command);
                }
            }
            Ok(other) => {
                tier_log!(self.logger, Debug, "ignoring binary frame from render side: {other:?}");
            }
            Err(err) => {
                self.stats.decode_fault();
                tier_log!(self.logger, Info, "dropped inbound frame: {err}");
            }
        }
        self.stats.inbound_processing(start.elapsed());
    }

    fn dispatch(&mut self, command: &Command) {
        if !self.state.accepts_traffic() && command.name != READY_FOR_SESSION {
            tier_log!(self.logger, Session, "ignoring {} before {READY_FOR_SESSION}", command.name);
            return;
        }
        let table = Arc::clone(&self.table);
        let mut fallback = self.fallback.take();
        let outcome = table.dispatch(self, command, fallback.as_mut());
        self.fallback = fallback;
        match outcome {
            Ok(Dispatched::Unknown) => {
                tier_log!(self.logger, Info, "unknown command from render side: {}", command.name);
            }
            Ok(_) => {}
            Err(err) => {
                if matches!(err, BridgeError::Decode(_)) {
                    self.stats.decode_fault();
                }
                tier_log!(self.logger, Info, "{} failed: {err}", command.name);
            }
        }
    }

    fn on_ready_for_session(&mut self, command: &Command) -> BridgeResult<()> {
        let credentials = SessionCredentials::from_command(command)?;
        tier_log!(
            self.logger,
            Session,
            "starting session {} of {}",
            credentials.session_name,
            credentials.app_id
        );
        self.credentials = Some(credentials);
        if self.state == SessionState::AwaitingCredentials {
            self.state = SessionState::Credentialed;
        }
        Ok(())
    }

    fn on_object_created(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let handle = resolve_alias(&command.args[0])?;
        let Some(slot) = self.pawns.lookup_mut(handle) else {
            tier_log!(self.logger, Debug, "objectCreated for absent pawn {handle}");
            return Ok(());
        };
        slot.view_ready = true;
        slot.pawn.view_ready();
        let delay = wall_clock_ms() - slot.setup_started_ms;
        self.setup_stats.record(delay);
        tier_log!(self.logger, Verbose, "object {handle} ready after {delay}ms");
        Ok(())
    }

    fn on_object_moved(&mut self, command: &Command) -> BridgeResult<()> {
        let (handle, update) = parse_object_moved(&command.args)?;
        match self
            .pawns
            .lookup_mut(handle)
            .and_then(|slot| slot.pawn.engine_moves())
        {
            Some(target) => target.apply_engine_move(&update),
            None => tier_log!(self.logger, Debug, "objectMoved for {handle} not accepted"),
        }
        Ok(())
    }

    fn on_event(&mut self, command: &Command) -> BridgeResult<()> {
        let pawns = &self.pawns;
        let event = parse_input_event(&command.args, |handle| pawns.contains(handle))?;
        if let Some(event) = event {
            self.input.publish(&event);
        }
        Ok(())
    }

    fn on_pong(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        #[allow(clippy::cast_possible_truncation)]
        let sent = parse_number(&command.args[0], PONG)? as i64;
        let round_trip = wall_clock_ms().saturating_sub(sent);
        self.last_round_trip_ms = Some(round_trip);
        tier_log!(self.logger, Diagnostics, "pong after {round_trip}ms");
        Ok(())
    }

    fn on_log(&mut self, command: &Command) -> BridgeResult<()> {
        tier_log!(self.logger, Info, "[render] {}", command.arg(0).unwrap_or_default());
        Ok(())
    }

    fn on_measure(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(3)?;
        tier_log!(
            self.logger,
            Diagnostics,
            "measure {} start={} duration={}ms {}",
            command.args[0],
            command.args[1],
            command.args[2],
            command.arg(3).unwrap_or_default()
        );
        Ok(())
    }

    fn on_shutdown(&mut self, _: &Command) -> BridgeResult<()> {
        tier_log!(self.logger, Session, "shutdown requested by render side");
        self.shutdown_requested = true;
        Ok(())
    }

    fn on_transport_fault(&mut self, err: &TransportError) {
        tier_log!(self.logger, Session, "transport fault: {err}");
        self.close_session();
    }

    fn close_session(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.state = SessionState::Closed;
        let dropped = self.pawns.drain().len();
        self.scheduler.clear();
        tier_log!(self.logger, Session, "session closed, {dropped} pawns dropped");
    }
}

impl<L> std::fmt::Debug for ModelBridge<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBridge")
            .field("state", &self.state)
            .field("pawns", &self.pawns.len())
            .field("pending_messages", &self.scheduler.pending_messages())
            .finish_non_exhaustive()
    }
}

fn pull_geometry(pawns: &mut ObjectRegistry<PawnSlot>) -> Vec<GeometryRecord> {
    pawns
        .iter_mut()
        .filter(|(_, slot)| slot.view_ready)
        .filter_map(|(handle, slot)| {
            let update = slot.pawn.spatial()?.geometry_update_if_needed()?;
            Some(GeometryRecord::new(handle, update))
        })
        .collect()
}

/// Parses `objectMoved` arguments: a handle, then `(s|r|p, "x,y,z[,w]")`
/// pairs for scale, rotation and position.
pub fn parse_object_moved<S: AsRef<str>>(args: &[S]) -> Result<(ObjectHandle, GeometryUpdate), DecodeError> {
    let Some(first) = args.first() else {
        return Err(DecodeError::MissingArguments {
            command: OBJECT_MOVED.to_owned(),
            expected: 1,
            got: 0,
        });
    };
    let handle = resolve_alias(first.as_ref())?;
    let mut update = GeometryUpdate::new();
    for pair in args[1..].chunks(2) {
        let [property, values] = pair else {
            return Err(DecodeError::MissingArguments {
                command: OBJECT_MOVED.to_owned(),
                expected: args.len() + 1,
                got: args.len(),
            });
        };
        let aspect = match property.as_ref() {
            "s" => "scale",
            "r" => "rotation",
            "p" => "translation",
            other => return Err(DecodeError::UnknownAspect(other.to_owned())),
        };
        let floats = parse_floats(values.as_ref(), aspect)?;
        update.set_axis(aspect, &floats, false)?;
    }
    Ok((handle, update))
}
