//! # Render Endpoint
//!
//! The engine side of the bridge. Applies what the model side sends to a
//! [`SceneGraph`] and reports acknowledgements, engine moves and input back.
//!
//! ## Inbound
//!
//! | Command | Effect |
//! |---------|--------|
//! | `_teatime` | feeds the clock reconciler, stamped with arrival time |
//! | `makeObject` | spawns, registers, acknowledges if asked |
//! | `destroyObject` | despawns; clears avatar and camera if they pointed at it |
//! | `setParent` / `unparent` | reparents in the scene |
//! | `updateGeometry` / `updateSpatial` | text or binary geometry |
//! | `grabCamera` / `releaseCamera` | parents the camera to an object |
//! | `croquetPing` | answered with `unityPong` |
//! | `setLogOptions` / `setMeasureOptions` | diagnostics switches |
//!
//! ## Outbound
//!
//! Replies are queued and leave as one frame (bundled if more than one) at
//! most once per send interval.

pub mod scene;

pub use scene::{MemoryScene, SceneGraph, SceneObject, SMOOTHING_FACTOR};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tether_shared::{InputEvent, ObjectHandle};

use crate::clock::{wall_clock_ms, ClockReconciler};
use crate::config::BridgeConfig;
use crate::dispatch::{DispatchTable, Dispatched, FallbackHandler, Handler, HandlerClass};
use crate::error::{BridgeError, BridgeResult, TransportError};
use crate::input::input_event_args;
use crate::logging::{tier_log, LogOptions, MeasureCategory, MeasureOptions, Measurement, TierLogger};
use crate::object_spec::ObjectSpec;
use crate::protocol::commands::{
    DESTROY_OBJECT, EVENT, GRAB_CAMERA, JOIN_PROGRESS, LOG, MAKE_OBJECT, MEASURE, OBJECT_CREATED,
    OBJECT_MOVED, PING, PONG, REGISTER_AS_AVATAR, RELEASE_CAMERA, SESSION_READY, SESSION_RUNNING,
    SET_LOG_OPTIONS, SET_MEASURE_OPTIONS, SET_PARENT, SHUTDOWN, TEAR_DOWN_SESSION, TEATIME,
    UNPARENT, UNREGISTER_AS_AVATAR,
};
use crate::protocol::{
    decode_frame, encode_bundle, encode_command, parse_floats, parse_timestamp, Arg, Command,
    Decoded, Frame, GeometryRecord, GeometryUpdate, TextFrame, GEOMETRY_COMMAND,
    LEGACY_GEOMETRY_COMMAND,
};
use crate::registry::{resolve_alias, ObjectRegistry};
use crate::scheduler::FlushTimer;
use crate::session::{SessionCredentials, SessionState};
use crate::stats::MessageStats;
use crate::transport::{FrameSink, FrameSource, InboundFrame, TransportEvent};

/// Render-side bookkeeping for one object.
#[derive(Debug)]
struct RenderObject {
    kind: String,
    /// Hidden until the first geometry update.
    awaiting_activation: bool,
}

/// The engine side of a bridge session, speaking over link `L` and driving
/// scene `G`.
pub struct RenderBridge<L, G> {
    link: L,
    scene: G,
    state: SessionState,
    credentials: SessionCredentials,
    view_id: Option<String>,
    clock: ClockReconciler,
    objects: ObjectRegistry<RenderObject>,
    outbox: Vec<String>,
    send_timer: FlushTimer,
    logger: TierLogger,
    measure: MeasureOptions,
    stats: MessageStats,
    avatar: Option<ObjectHandle>,
    camera_owner: Option<ObjectHandle>,
    table: Arc<DispatchTable<Self>>,
    fallback: Option<FallbackHandler>,
    /// Arrival time of the frame being handled.
    arrival: Instant,
    shutdown_requested: bool,
}

impl<L: FrameSink, G: SceneGraph> RenderBridge<L, G> {
    /// Creates an endpoint. Call [`Self::start`] to open the session.
    #[must_use]
    pub fn new(link: L, scene: G, config: &BridgeConfig) -> Self {
        Self {
            link,
            scene,
            state: SessionState::AwaitingCredentials,
            credentials: SessionCredentials::new(
                config.api_key.as_str(),
                config.app_id.as_str(),
                config.session_name.as_str(),
            ),
            view_id: None,
            clock: ClockReconciler::new(),
            objects: ObjectRegistry::new(),
            outbox: Vec::new(),
            send_timer: FlushTimer::new(config.render_send_interval()),
            logger: TierLogger::new(config.log_options()),
            measure: config.measure_options(),
            stats: MessageStats::new(config.stats_interval()),
            avatar: None,
            camera_owner: None,
            table: Arc::new(Self::command_table()),
            fallback: None,
            arrival: Instant::now(),
            shutdown_requested: false,
        }
    }

    fn command_table() -> DispatchTable<Self> {
        use HandlerClass::{ClockDiagnostic, PassThrough, Registry};

        let mut table = DispatchTable::new();
        table
            .register(TEATIME, ClockDiagnostic, Self::on_teatime)
            .register(PING, ClockDiagnostic, Self::on_ping)
            .register(LOG, ClockDiagnostic, Self::on_log)
            .register(SET_LOG_OPTIONS, ClockDiagnostic, Self::on_set_log_options)
            .register(SET_MEASURE_OPTIONS, ClockDiagnostic, Self::on_set_measure_options)
            .register(SESSION_RUNNING, ClockDiagnostic, Self::on_session_running)
            .register(SESSION_READY, ClockDiagnostic, Self::on_session_running)
            .register(JOIN_PROGRESS, ClockDiagnostic, Self::on_join_progress)
            .register(TEAR_DOWN_SESSION, ClockDiagnostic, Self::on_tear_down)
            .register(SHUTDOWN, ClockDiagnostic, Self::on_shutdown)
            .register(MAKE_OBJECT, Registry, Self::on_make_object)
            .register(DESTROY_OBJECT, Registry, Self::on_destroy_object)
            .register(SET_PARENT, Registry, Self::on_set_parent)
            .register(UNPARENT, Registry, Self::on_unparent)
            .register(GEOMETRY_COMMAND, Registry, Self::on_update_geometry)
            .register(LEGACY_GEOMETRY_COMMAND, Registry, Self::on_update_geometry)
            .register(REGISTER_AS_AVATAR, PassThrough, Self::on_register_avatar)
            .register(UNREGISTER_AS_AVATAR, PassThrough, Self::on_unregister_avatar)
            .register(GRAB_CAMERA, PassThrough, Self::on_grab_camera)
            .register(RELEASE_CAMERA, PassThrough, Self::on_release_camera);
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

    /// View id from the session-running announcement.
    #[must_use]
    pub fn view_id(&self) -> Option<&str> {
        self.view_id.as_deref()
    }

    /// The scene.
    pub const fn scene(&self) -> &G {
        &self.scene
    }

    /// The scene, mutably.
    pub fn scene_mut(&mut self) -> &mut G {
        &mut self.scene
    }

    /// Message counters for the current reporting interval.
    #[must_use]
    pub const fn stats(&self) -> &MessageStats {
        &self.stats
    }

    /// The clock reconciler.
    #[must_use]
    pub const fn clock(&self) -> &ClockReconciler {
        &self.clock
    }

    /// Estimated model virtual time, once a beacon arrived.
    #[must_use]
    pub fn session_time(&self) -> Option<i64> {
        self.clock.now()
    }

    /// The local avatar, if one is registered.
    #[must_use]
    pub const fn avatar(&self) -> Option<ObjectHandle> {
        self.avatar
    }

    /// The object the camera is attached to.
    #[must_use]
    pub const fn camera_owner(&self) -> Option<ObjectHandle> {
        self.camera_owner
    }

    /// Registered objects, camera excluded.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// True if `handle` names a registered object.
    #[must_use]
    pub fn has_object(&self, handle: ObjectHandle) -> bool {
        self.objects.contains(handle)
    }

    /// Prefab or primitive name of a registered object.
    #[must_use]
    pub fn object_kind(&self, handle: ObjectHandle) -> Option<&str> {
        self.objects.lookup(handle).map(|object| object.kind.as_str())
    }

    /// Commands queued for the next send.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Measurement switches.
    #[must_use]
    pub const fn measure_options(&self) -> MeasureOptions {
        self.measure
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

    /// True once the model side sent `shutdown`.
    #[must_use]
    pub const fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Binds an application command.
    pub fn register_handler(&mut self, name: &'static str, handler: Handler<Self>) {
        Arc::make_mut(&mut self.table).register(name, HandlerClass::PassThrough, handler);
    }

    /// Sets the handler for commands nobody else claims.
    pub fn set_fallback(&mut self, fallback: FallbackHandler) {
        self.fallback = Some(fallback);
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Sends the session triad and opens the session.
    ///
    /// # Errors
    ///
    /// Transport faults, which also close the session.
    pub fn start(&mut self) -> BridgeResult<()> {
        let frame = Frame::Text(self.credentials.to_command().encode());
        self.send_frame(frame, 1)?;
        self.state = SessionState::Credentialed;
        tier_log!(
            self.logger,
            Session,
            "sent credentials for {} of {}",
            self.credentials.session_name,
            self.credentials.app_id
        );
        Ok(())
    }

    /// Queues a command for the next send.
    pub fn send_command(&mut self, name: &str, args: &[Arg]) {
        self.outbox.push(encode_command(name, args));
    }

    /// Forwards an input event to the model side.
    pub fn report_event(&mut self, event: &InputEvent) {
        self.send_command(EVENT, &input_event_args(event));
    }

    /// Tells the model side the engine moved an object.
    pub fn report_engine_move(&mut self, handle: ObjectHandle, update: &GeometryUpdate) {
        self.send_command(OBJECT_MOVED, &object_moved_args(handle, update));
    }

    /// Sends whatever is queued, now, regardless of the send interval.
    pub fn flush(&mut self) -> BridgeResult<()> {
        if self.outbox.is_empty() {
            return Ok(());
        }
        let messages = std::mem::take(&mut self.outbox);
        let frame = match messages.as_slice() {
            [single] => Frame::Text(single.clone()),
            _ => Frame::Text(encode_bundle(wall_clock_ms(), &messages)),
        };
        self.send_frame(frame, messages.len())
    }

    fn send_frame(&mut self, frame: Frame, messages: usize) -> BridgeResult<()> {
        match self.link.send_frame(frame) {
            Ok(()) => {
                self.stats.outbound_frame(messages);
                Ok(())
            }
            Err(err) => {
                self.on_transport_fault(&err);
                Err(err.into())
            }
        }
    }

    /// Says goodbye and closes the session.
    pub fn shutdown(&mut self) {
        if !self.state.is_closed() {
            self.send_command(SHUTDOWN, &[]);
            let _ = self.flush();
        }
        self.close_session();
    }

    /// One engine frame: advances smoothing, forwards routed log lines,
    /// reports stats and sends if the interval allows.
    pub fn tick(&mut self, now: Instant) -> BridgeResult<()> {
        if self.state.is_closed() {
            return Ok(());
        }
        let started_ms = wall_clock_ms();
        let started = Instant::now();

        self.scene.step();
        for line in self.logger.take_routed() {
            self.send_command(LOG, &[Arg::Text(line)]);
        }
        if let Some(report) = self.stats.maybe_report(now) {
            if !report.is_idle() {
                tier_log!(self.logger, Diagnostics, "{report}");
            }
        }
        if self.send_timer.poll(now) {
            self.flush()?;
        }

        if self.measure.enabled(MeasureCategory::Update) {
            self.queue_measurement(Measurement {
                category: MeasureCategory::Update,
                start_ms: started_ms,
                duration_ms: millis(started.elapsed()),
                annotation: None,
            });
        }
        Ok(())
    }

    fn queue_measurement(&mut self, measurement: Measurement) {
        let args: Vec<Arg> = measurement.to_args().into_iter().map(Arg::Text).collect();
        self.send_command(MEASURE, &args);
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
                    "model side disconnected{}",
                    reason.map(|r| format!(": {r}")).unwrap_or_default()
                );
                self.close_session();
            }
        }
    }

    /// Decodes and applies one inbound frame.
    pub fn handle_frame(&mut self, inbound: &InboundFrame) {
        self.arrival = inbound.queued_at;
        let started_ms = wall_clock_ms();
        let started = Instant::now();

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
                if self.measure.enabled(MeasureCategory::Bundle) {
                    let what = format!("{} msgs in {} chars", commands.len(), inbound.frame.len());
                    self.measure_frame(MeasureCategory::Bundle, timestamp, inbound, started_ms, started, &what);
                }
            }
            Ok(Decoded::Geometry {
                timestamp,
                records,
                fault,
            }) => {
                for record in &records {
                    self.apply_record(record);
                }
                if let Some(err) = fault {
                    self.stats.decode_fault();
                    tier_log!(self.logger, Info, "geometry batch cut short: {err}");
                }
                if self.measure.enabled(MeasureCategory::Geom) {
                    let what = format!("{} objects, {} bytes", records.len(), inbound.frame.len());
                    self.measure_frame(MeasureCategory::Geom, timestamp, inbound, started_ms, started, &what);
                }
            }
            Ok(Decoded::OtherBinary { command, payload, .. }) => {
                tier_log!(
                    self.logger,
                    Info,
                    "unhandled binary {command} ({} bytes)",
                    payload.len()
                );
            }
            Err(err) => {
                self.stats.decode_fault();
                tier_log!(self.logger, Info, "dropped inbound frame: {err}");
            }
        }
        self.stats.inbound_processing(started.elapsed());
    }

    fn measure_frame(
        &mut self,
        category: MeasureCategory,
        sent_ms: i64,
        inbound: &InboundFrame,
        started_ms: i64,
        started: Instant,
        what: &str,
    ) {
        let sock = inbound.queued_at_ms.saturating_sub(sent_ms);
        let queue = started_ms.saturating_sub(inbound.queued_at_ms);
        let process = millis(started.elapsed());
        self.queue_measurement(Measurement {
            category,
            start_ms: sent_ms,
            duration_ms: wall_clock_ms().saturating_sub(sent_ms),
            annotation: Some(format!(
                "{what}. sock={sock}ms, queue={queue}ms, process={process}ms"
            )),
        });
    }

    fn dispatch(&mut self, command: &Command) {
        if self.state.is_closed() {
            return;
        }
        let table = Arc::clone(&self.table);
        let mut fallback = self.fallback.take();
        let outcome = table.dispatch(self, command, fallback.as_mut());
        self.fallback = fallback;
        match outcome {
            Ok(Dispatched::Unknown) => {
                tier_log!(self.logger, Info, "unknown command from model side: {}", command.name);
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

    fn is_known(&self, handle: ObjectHandle) -> bool {
        handle == ObjectHandle::CAMERA || self.objects.contains(handle)
    }

    fn apply_record(&mut self, record: &GeometryRecord) {
        self.apply_update(record.handle, &record.update);
    }

    fn apply_update(&mut self, handle: ObjectHandle, update: &GeometryUpdate) {
        if handle == ObjectHandle::CAMERA {
            self.scene.apply_geometry(handle, update);
            return;
        }
        let Some(object) = self.objects.lookup_mut(handle) else {
            tier_log!(self.logger, Debug, "geometry for absent object {handle}");
            return;
        };
        self.scene.apply_geometry(handle, update);
        if object.awaiting_activation {
            object.awaiting_activation = false;
            self.scene.set_active(handle, true);
        }
    }

    fn on_teatime(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let remote = parse_timestamp(&command.args[0])?;
        let elapsed = self.clock.elapsed_ms_at(self.arrival);
        let offset = self.clock.on_beacon_at(remote, elapsed)?;
        tier_log!(self.logger, Verbose, "teatime {remote}, offset now {offset}ms");
        Ok(())
    }

    fn on_ping(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let echo = Arg::from(&command.args[0]);
        self.send_command(PONG, &[echo]);
        Ok(())
    }

    fn on_log(&mut self, command: &Command) -> BridgeResult<()> {
        tier_log!(self.logger, Info, "[model] {}", command.arg(0).unwrap_or_default());
        Ok(())
    }

    fn on_set_log_options(&mut self, command: &Command) -> BridgeResult<()> {
        let options = LogOptions::parse(command.arg(0).unwrap_or_default());
        tier_log!(self.logger, Session, "log options now {}", options.to_list());
        self.logger.set_options(options);
        Ok(())
    }

    fn on_set_measure_options(&mut self, command: &Command) -> BridgeResult<()> {
        self.measure = MeasureOptions::parse(command.arg(0).unwrap_or_default());
        Ok(())
    }

    fn on_session_running(&mut self, command: &Command) -> BridgeResult<()> {
        let view_id = command.arg(0).unwrap_or_default().to_owned();
        tier_log!(self.logger, Session, "session running as {view_id}");
        self.view_id = Some(view_id);
        self.state = SessionState::Running;
        Ok(())
    }

    fn on_join_progress(&mut self, command: &Command) -> BridgeResult<()> {
        tier_log!(self.logger, Verbose, "join progress {}", command.arg(0).unwrap_or_default());
        Ok(())
    }

    fn on_tear_down(&mut self, _: &Command) -> BridgeResult<()> {
        let dropped = self.clear_objects();
        self.clock.reset();
        self.view_id = None;
        if self.state == SessionState::Running {
            self.state = SessionState::Credentialed;
        }
        tier_log!(self.logger, Session, "session torn down, {dropped} objects removed");
        Ok(())
    }

    fn on_shutdown(&mut self, _: &Command) -> BridgeResult<()> {
        tier_log!(self.logger, Session, "shutdown requested by model side");
        self.shutdown_requested = true;
        Ok(())
    }

    fn on_make_object(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let spec = ObjectSpec::from_json(&command.args[0])?;
        let handle = spec.handle;
        if self.objects.contains(handle) {
            tier_log!(self.logger, Debug, "replacing live object {handle}");
            self.scene.despawn(handle);
        }

        let created = self.scene.spawn(handle, &spec, !spec.wait_to_activate);
        let object = created.then(|| RenderObject {
            kind: spec.kind.clone(),
            awaiting_activation: spec.wait_to_activate,
        });
        match self.objects.create(handle, object) {
            Ok(_) => {
                tier_log!(self.logger, Verbose, "made {} as {handle}", spec.kind);
                if spec.confirm_creation {
                    self.send_command(OBJECT_CREATED, &[Arg::from(handle), Arg::from(wall_clock_ms())]);
                }
            }
            Err(handle) => {
                tier_log!(self.logger, Info, "could not make {} for {handle}", spec.kind);
            }
        }
        Ok(())
    }

    fn on_destroy_object(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let handle = resolve_alias(&command.args[0])?;
        if self.objects.destroy(handle).is_none() {
            tier_log!(self.logger, Debug, "destroy for absent object {handle}");
            return Ok(());
        }
        self.forget(handle);
        Ok(())
    }

    fn forget(&mut self, handle: ObjectHandle) {
        if self.camera_owner == Some(handle) {
            self.scene.set_parent(ObjectHandle::CAMERA, None);
            self.camera_owner = None;
        }
        if self.avatar == Some(handle) {
            self.avatar = None;
        }
        self.scene.despawn(handle);
    }

    fn clear_objects(&mut self) -> usize {
        let drained = self.objects.drain();
        for (handle, _) in &drained {
            self.forget(*handle);
        }
        drained.len()
    }

    fn on_set_parent(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(2)?;
        let child = resolve_alias(&command.args[0])?;
        let parent = resolve_alias(&command.args[1])?;
        if self.is_known(child) && self.is_known(parent) {
            self.scene.set_parent(child, Some(parent));
        } else {
            tier_log!(self.logger, Debug, "setParent {child} -> {parent}: absent object");
        }
        Ok(())
    }

    fn on_unparent(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let child = resolve_alias(&command.args[0])?;
        if self.is_known(child) {
            self.scene.set_parent(child, None);
        }
        Ok(())
    }

    fn on_update_geometry(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let handle = resolve_alias(&command.args[0])?;
        let update = GeometryUpdate::from_text_args(&command.args[1..])?;
        self.apply_update(handle, &update);
        Ok(())
    }

    fn on_register_avatar(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let handle = resolve_alias(&command.args[0])?;
        tier_log!(self.logger, Session, "local avatar is {handle}");
        self.avatar = Some(handle);
        Ok(())
    }

    fn on_unregister_avatar(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let handle = resolve_alias(&command.args[0])?;
        if self.avatar == Some(handle) {
            self.avatar = None;
        }
        Ok(())
    }

    fn on_grab_camera(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(3)?;
        let handle = resolve_alias(&command.args[0])?;
        if !self.objects.contains(handle) {
            tier_log!(self.logger, Debug, "grabCamera for absent object {handle}");
            return Ok(());
        }
        let mut offset = GeometryUpdate::new();
        offset.set_axis("rotation", &parse_floats(&command.args[1], "rotation")?, true)?;
        offset.set_axis("translation", &parse_floats(&command.args[2], "translation")?, true)?;

        self.scene.set_parent(ObjectHandle::CAMERA, Some(handle));
        self.scene.apply_geometry(ObjectHandle::CAMERA, &offset);
        self.camera_owner = Some(handle);
        Ok(())
    }

    fn on_release_camera(&mut self, command: &Command) -> BridgeResult<()> {
        command.require(1)?;
        let handle = resolve_alias(&command.args[0])?;
        if self.camera_owner == Some(handle) {
            self.scene.set_parent(ObjectHandle::CAMERA, None);
            self.camera_owner = None;
        }
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
        let dropped = self.clear_objects();
        self.outbox.clear();
        self.clock.reset();
        tier_log!(self.logger, Session, "session closed, {dropped} objects removed");
    }
}

impl<L, G> std::fmt::Debug for RenderBridge<L, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBridge")
            .field("state", &self.state)
            .field("objects", &self.objects.len())
            .field("queued", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

/// `objectMoved` arguments: the handle, then `s`/`r`/`p` with a
/// comma-joined value for each changed axis.
#[must_use]
pub fn object_moved_args(handle: ObjectHandle, update: &GeometryUpdate) -> Vec<Arg> {
    let mut args = vec![Arg::from(handle)];
    if let Some(axis) = update.scale {
        args.extend([Arg::from("s"), Arg::from(axis.value)]);
    }
    if let Some(axis) = update.rotation {
        args.extend([Arg::from("r"), Arg::from(axis.value)]);
    }
    if let Some(axis) = update.translation {
        args.extend([Arg::from("p"), Arg::from(axis.value)]);
    }
    args
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_object_moved;
    use crate::protocol::{decode_text, encode_geometry_frame, AxisUpdate, ByteWriter};
    use tether_shared::{Quaternion, Vec3};

    type Bridge = RenderBridge<Vec<Frame>, MemoryScene>;

    fn started() -> Bridge {
        let config = BridgeConfig {
            api_key: "key".into(),
            ..BridgeConfig::default()
        };
        let mut bridge = RenderBridge::new(Vec::new(), MemoryScene::new(), &config);
        bridge.start().unwrap();
        bridge.link_mut().clear();
        bridge
    }

    fn text(bridge: &mut Bridge, text: &str) {
        bridge.handle_frame(&InboundFrame::now(Frame::Text(text.to_owned())));
    }

    fn make(bridge: &mut Bridge, spec: &ObjectSpec) {
        text(bridge, &format!("makeObject\x01{}", spec.to_json().unwrap()));
    }

    fn sent(bridge: &mut Bridge) -> Vec<Command> {
        bridge.flush().unwrap();
        bridge
            .link_mut()
            .drain(..)
            .flat_map(|frame| match frame {
                Frame::Text(text) => decode_text(&text).unwrap().into_commands(),
                Frame::Binary(_) => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_start_sends_credentials() {
        let config = BridgeConfig::default();
        let mut bridge: Bridge = RenderBridge::new(Vec::new(), MemoryScene::new(), &config);
        bridge.start().unwrap();
        assert_eq!(bridge.state(), SessionState::Credentialed);
        assert_eq!(
            bridge.link()[0],
            Frame::Text(format!("readyForSession\x01\x01{}\x01{}", config.app_id, config.session_name))
        );
    }

    #[test]
    fn test_make_object_acknowledged_only_when_asked() {
        let mut bridge = started();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "primitiveCube"));
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(151), "primitiveSphere").confirmed());
        assert_eq!(bridge.object_count(), 2);
        assert_eq!(bridge.object_kind(ObjectHandle(151)), Some("primitiveSphere"));

        let replies = sent(&mut bridge);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].name, "objectCreated");
        assert_eq!(replies[0].args[0], "151");
    }

    #[test]
    fn test_failed_spawn_not_registered() {
        let config = BridgeConfig::default();
        let scene = MemoryScene::new().rejecting("missingPrefab");
        let mut bridge: Bridge = RenderBridge::new(Vec::new(), scene, &config);
        bridge.start().unwrap();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "missingPrefab").confirmed());
        assert!(!bridge.has_object(ObjectHandle(150)));
        assert_eq!(bridge.queued(), 0);
    }

    #[test]
    fn test_wait_to_activate_until_first_geometry() {
        let mut bridge = started();
        let mut spec = ObjectSpec::new(ObjectHandle(150), "primitiveCube");
        spec.wait_to_activate = true;
        make(&mut bridge, &spec);
        assert!(!bridge.scene().get(ObjectHandle(150)).unwrap().active);

        text(&mut bridge, "updateSpatial\x01150\x01translationSnap\x011\x012\x013");
        let object = bridge.scene().get(ObjectHandle(150)).unwrap();
        assert!(object.active);
        assert_eq!(object.transform.translation, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_binary_geometry_skips_unknown_handles() {
        let mut bridge = started();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "primitiveCube"));
        let records = [
            GeometryRecord::new(ObjectHandle(999), GeometryUpdate::new().with_translation_snap(Vec3::ONE)),
            GeometryRecord::new(
                ObjectHandle(150),
                GeometryUpdate::new().with_scale_snap(Vec3::new(2.0, 2.0, 2.0)),
            ),
        ];
        let mut writer = ByteWriter::new();
        encode_geometry_frame(&mut writer, wall_clock_ms(), &records);
        bridge.handle_frame(&InboundFrame::now(Frame::Binary(writer.into_inner())));

        assert_eq!(
            bridge.scene().get(ObjectHandle(150)).unwrap().transform.scale,
            Vec3::new(2.0, 2.0, 2.0)
        );
        assert!(bridge.scene().get(ObjectHandle(999)).is_none());
    }

    #[test]
    fn test_truncated_batch_applies_leading_records() {
        let mut bridge = started();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "primitiveCube"));
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(151), "primitiveCube"));
        let records = [
            GeometryRecord::new(ObjectHandle(150), GeometryUpdate::new().with_translation_snap(Vec3::ONE)),
            GeometryRecord::new(
                ObjectHandle(151),
                GeometryUpdate::new().with_translation_snap(Vec3::new(5.0, 5.0, 5.0)),
            ),
        ];
        let mut writer = ByteWriter::new();
        encode_geometry_frame(&mut writer, wall_clock_ms(), &records);
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 4);
        bridge.handle_frame(&InboundFrame::now(Frame::Binary(bytes)));

        assert_eq!(bridge.scene().get(ObjectHandle(150)).unwrap().transform.translation, Vec3::ONE);
        assert_eq!(bridge.scene().get(ObjectHandle(151)).unwrap().transform.translation, Vec3::ZERO);
        assert_eq!(bridge.stats().current().decode_faults, 1);
    }

    #[test]
    fn test_extreme_timestamps_are_survivable() {
        let mut bridge = started();
        text(&mut bridge, "setMeasureOptions\x01bundle,geom");
        text(&mut bridge, "-9223372036854775808\x02log\x01a\x02log\x01b");
        text(&mut bridge, "9223372036854775807\x02log\x01a\x02log\x01b");
        text(&mut bridge, "-1e30\x02log\x01a\x02log\x01b");
        text(&mut bridge, "_teatime\x01-9223372036854775808");
        text(&mut bridge, "_teatime\x019223372036854775807");

        let mut bytes = b"-9223372036854775808\x02updateGeometry\x03".to_vec();
        let mut writer = ByteWriter::new();
        assert!(GeometryRecord::new(ObjectHandle::CAMERA, GeometryUpdate::new().with_scale(Vec3::ONE))
            .write_to(&mut writer));
        bytes.extend_from_slice(writer.as_slice());
        bridge.handle_frame(&InboundFrame::now(Frame::Binary(bytes)));

        assert_eq!(bridge.state(), SessionState::Credentialed);
        assert_eq!(bridge.stats().current().in_bundles, 3);
        let _ = bridge.session_time();
        let measures = sent(&mut bridge).into_iter().filter(|c| c.name == "measure").count();
        assert_eq!(measures, 4);
    }

    #[test]
    fn test_geometry_measure_reported_when_enabled() {
        let mut bridge = started();
        text(&mut bridge, "setMeasureOptions\x01geom");
        assert!(bridge.measure_options().geom);

        let mut writer = ByteWriter::new();
        let record = GeometryRecord::new(ObjectHandle::CAMERA, GeometryUpdate::new().with_scale(Vec3::ONE));
        encode_geometry_frame(&mut writer, wall_clock_ms(), [&record]);
        bridge.handle_frame(&InboundFrame::now(Frame::Binary(writer.into_inner())));

        let replies = sent(&mut bridge);
        assert_eq!(replies[0].name, "measure");
        assert_eq!(replies[0].args[0], "geom");
        assert!(replies[0].args[3].starts_with("1 objects"));
    }

    #[test]
    fn test_camera_follows_grab_and_destroy() {
        let mut bridge = started();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "avatar"));
        text(&mut bridge, "registerAsAvatar\x01150");
        text(&mut bridge, "grabCamera\x01150\x010,0,0,1\x010,2,-5");

        let camera = bridge.scene().get(ObjectHandle::CAMERA).unwrap();
        assert_eq!(camera.parent, Some(ObjectHandle(150)));
        assert_eq!(camera.transform.translation, Vec3::new(0.0, 2.0, -5.0));
        assert_eq!(camera.transform.rotation, Quaternion::IDENTITY);
        assert_eq!(bridge.avatar(), Some(ObjectHandle(150)));

        text(&mut bridge, "destroyObject\x01150");
        assert_eq!(bridge.camera_owner(), None);
        assert_eq!(bridge.avatar(), None);
        assert_eq!(bridge.scene().get(ObjectHandle::CAMERA).unwrap().parent, None);
    }

    #[test]
    fn test_camera_alias_accepted() {
        let mut bridge = started();
        text(&mut bridge, "updateGeometry\x01camera\x01translationSnap\x015\x010\x010");
        assert_eq!(
            bridge.scene().get(ObjectHandle::CAMERA).unwrap().transform.translation,
            Vec3::new(5.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_parenting() {
        let mut bridge = started();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "a"));
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(151), "b"));
        text(&mut bridge, "setParent\x01151\x01150");
        assert_eq!(bridge.scene().children(ObjectHandle(150)), vec![ObjectHandle(151)]);
        text(&mut bridge, "unparent\x01151");
        assert!(bridge.scene().children(ObjectHandle(150)).is_empty());
    }

    #[test]
    fn test_teatime_and_ping() {
        let mut bridge = started();
        assert_eq!(bridge.session_time(), None);
        let ts = wall_clock_ms();
        text(&mut bridge, &format!("{ts}\x02_teatime\x015000\x02croquetPing\x01{ts}"));
        assert!(bridge.clock().is_ready());
        assert!(bridge.session_time().unwrap() >= 5000);

        let replies = sent(&mut bridge);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].name, "unityPong");
        assert_eq!(replies[0].args, vec![ts.to_string()]);
    }

    #[test]
    fn test_tick_bundles_queued_replies() {
        let mut bridge = started();
        bridge.report_event(&InputEvent::KeyDown { key: "Space".into() });
        bridge.report_engine_move(ObjectHandle(150), &GeometryUpdate::new().with_translation(Vec3::ONE));
        bridge.tick(Instant::now()).unwrap();

        assert_eq!(bridge.link().len(), 1);
        let Frame::Text(frame) = &bridge.link()[0] else {
            panic!("expected text");
        };
        let commands = decode_text(frame).unwrap().into_commands();
        assert_eq!(commands[0].name, "event");
        assert_eq!(commands[1].name, "objectMoved");
        let (handle, update) = parse_object_moved(&commands[1].args).unwrap();
        assert_eq!(handle, ObjectHandle(150));
        assert_eq!(update.translation, Some(AxisUpdate::smooth(Vec3::ONE)));
    }

    #[test]
    fn test_routed_log_lines_go_to_model() {
        let mut bridge = started();
        text(&mut bridge, "setLogOptions\x01info,routeToCroquet");
        text(&mut bridge, "log\x01hello");
        let replies = sent(&mut bridge);
        assert!(replies.is_empty());

        bridge.tick(Instant::now()).unwrap();
        let replies = sent(&mut bridge);
        assert_eq!(replies[0].name, "log");
        assert_eq!(replies[0].args, vec!["[model] hello"]);
    }

    #[test]
    fn test_session_running_and_tear_down() {
        let mut bridge = started();
        text(&mut bridge, "croquetSessionRunning\x01view-1");
        assert_eq!(bridge.state(), SessionState::Running);
        assert_eq!(bridge.view_id(), Some("view-1"));
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "a"));

        text(&mut bridge, "tearDownSession");
        assert_eq!(bridge.object_count(), 0);
        assert_eq!(bridge.scene().len(), 1);
        assert_eq!(bridge.state(), SessionState::Credentialed);
    }

    #[test]
    fn test_unknown_goes_to_fallback() {
        let mut bridge = started();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.set_fallback(Box::new(move |command| {
            sink.lock().push(command.name.clone());
            true
        }));
        text(&mut bridge, "setColor\x01150\x011,0,0");
        assert_eq!(*seen.lock(), vec!["setColor"]);
    }

    #[test]
    fn test_close_clears_everything() {
        let mut bridge = started();
        make(&mut bridge, &ObjectSpec::new(ObjectHandle(150), "a").confirmed());
        bridge.handle_event(TransportEvent::Closed(None));
        assert_eq!(bridge.state(), SessionState::Closed);
        assert_eq!(bridge.object_count(), 0);
        assert_eq!(bridge.queued(), 0);
        bridge.tick(Instant::now()).unwrap();
        assert!(bridge.link().is_empty());
    }
}
