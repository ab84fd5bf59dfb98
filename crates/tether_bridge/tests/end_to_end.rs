//! Both endpoints wired together, over an in-process link and over TCP.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_bridge::protocol::{decode_frame, ByteWriter, Decoded};
use tether_bridge::transport::InboundFrame;
use tether_bridge::{
    AxisUpdate, BridgeConfig, BridgeListener, BridgeTransport, DeferredScheduler, EngineMoves,
    Frame, GeometryRecord, GeometryUpdate, InputEvent, MemoryLink, MemoryScene, ModelBridge, ObjectHandle,
    ObjectSpec, Pawn, RenderBridge, SceneGraph, SessionState, SpatialPawn, SpatialTracker, Transform, Vec3,
};
use tether_shared::{EventTopic, PointerHit};

/// A pawn whose transform the test moves from outside.
struct Puppet {
    transform: Arc<Mutex<Transform>>,
    tracker: SpatialTracker,
    moves: Arc<Mutex<Vec<GeometryUpdate>>>,
}

impl SpatialPawn for Puppet {
    fn geometry_update_if_needed(&mut self) -> Option<GeometryUpdate> {
        let current = *self.transform.lock();
        self.tracker.update_if_needed(&current)
    }
}

impl EngineMoves for Puppet {
    fn apply_engine_move(&mut self, update: &GeometryUpdate) {
        self.moves.lock().push(*update);
    }
}

impl Pawn for Puppet {
    fn spatial(&mut self) -> Option<&mut dyn SpatialPawn> {
        Some(self)
    }

    fn engine_moves(&mut self) -> Option<&mut dyn EngineMoves> {
        Some(self)
    }
}

struct Strings {
    transform: Arc<Mutex<Transform>>,
    moves: Arc<Mutex<Vec<GeometryUpdate>>>,
}

fn puppet() -> (Box<Puppet>, Strings) {
    let transform = Arc::new(Mutex::new(Transform::IDENTITY));
    let moves = Arc::new(Mutex::new(Vec::new()));
    let pawn = Box::new(Puppet {
        transform: Arc::clone(&transform),
        tracker: SpatialTracker::smoothed(),
        moves: Arc::clone(&moves),
    });
    (pawn, Strings { transform, moves })
}

fn memory_pair() -> (ModelBridge<MemoryLink>, RenderBridge<MemoryLink, MemoryScene>) {
    let config = BridgeConfig {
        api_key: "key".into(),
        ..BridgeConfig::default()
    };
    let (model_end, render_end) = MemoryLink::pair(1024);
    let mut render = RenderBridge::new(render_end, MemoryScene::new(), &config);
    let mut model = ModelBridge::new(model_end, &config);
    render.start().unwrap();
    model.pump();
    assert_eq!(model.state(), SessionState::Credentialed);
    model.announce_session_running("view-1").unwrap();
    (model, render)
}

fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_object_lifecycle_over_memory_link() {
    let (mut model, mut render) = memory_pair();
    let t0 = Instant::now();

    let (pawn, strings) = puppet();
    let handle = model
        .create_object(pawn, ObjectSpec::new(ObjectHandle(0), "primitiveCube").confirmed())
        .unwrap();
    model.tick(t0, 0.0).unwrap();

    render.pump();
    assert_eq!(render.state(), SessionState::Running);
    assert!(render.has_object(handle));
    assert!(render.clock().is_ready());
    assert!(!model.is_view_ready(handle));

    render.tick(t0).unwrap();
    model.pump();
    assert!(model.is_view_ready(handle));

    // First report snaps.
    strings.transform.lock().translation = Vec3::new(0.0, 5.0, 0.0);
    model.tick(t0 + Duration::from_millis(100), 100.0).unwrap();
    render.pump();
    let object = render.scene().get(handle).unwrap();
    assert_eq!(object.transform.translation, Vec3::new(0.0, 5.0, 0.0));

    // Later reports are smoothed.
    strings.transform.lock().translation = Vec3::new(4.0, 5.0, 0.0);
    model.tick(t0 + Duration::from_millis(200), 200.0).unwrap();
    render.pump();
    let object = render.scene().get(handle).unwrap();
    assert_eq!(object.target.translation, Vec3::new(4.0, 5.0, 0.0));
    assert_eq!(object.transform.translation, Vec3::new(0.0, 5.0, 0.0));
    render.scene_mut().step();
    let x = render.scene().get(handle).unwrap().transform.translation.x;
    assert!(x > 0.0 && x < 4.0);

    model.destroy_object(handle).unwrap();
    model.tick(t0 + Duration::from_millis(300), 300.0).unwrap();
    render.pump();
    assert!(!render.has_object(handle));
    assert!(render.scene().get(handle).is_none());
}

#[test]
fn test_merged_geometry_for_handle_seven() {
    let (_model, mut render) = memory_pair();
    let spec = ObjectSpec::new(ObjectHandle(7), "primitiveCube")
        .with_transform(Transform::new(Vec3::ONE, tether_bridge::Quaternion::IDENTITY, Vec3::ZERO));
    render.handle_frame(&InboundFrame::now(Frame::Text(format!(
        "makeObject\x01{}",
        spec.to_json().unwrap()
    ))));
    assert!(render.has_object(ObjectHandle(7)));

    let mut scheduler = DeferredScheduler::default();
    scheduler.enqueue_geometry(
        ObjectHandle(7),
        &GeometryUpdate::new().with_translation(Vec3::new(1.0, 0.0, 0.0)),
    );
    scheduler.enqueue_geometry(
        ObjectHandle(7),
        &GeometryUpdate::new().with_translation_snap(Vec3::new(2.0, 0.0, 0.0)),
    );
    let (frame, written) = scheduler.compose_geometry(42, Vec::<GeometryRecord>::new()).unwrap();
    assert_eq!(written, 1);

    match decode_frame(&frame).unwrap() {
        Decoded::Geometry { records, fault, .. } => {
            assert!(fault.is_none());
            assert_eq!(records.len(), 1);
            assert_eq!(
                records[0].update.translation,
                Some(AxisUpdate::snap(Vec3::new(2.0, 0.0, 0.0)))
            );
            assert_eq!(records[0].update.scale, None);
            assert_eq!(records[0].update.rotation, None);
        }
        other => panic!("unexpected {other:?}"),
    }

    render.handle_frame(&InboundFrame::now(frame));
    let object = render.scene().get(ObjectHandle(7)).unwrap();
    assert_eq!(object.transform.translation, Vec3::new(2.0, 0.0, 0.0));
}

#[test]
fn test_input_and_engine_moves_reach_model() {
    let (mut model, mut render) = memory_pair();
    let t0 = Instant::now();
    let (pawn, strings) = puppet();
    let handle = model
        .create_object(pawn, ObjectSpec::new(ObjectHandle(0), "ball"))
        .unwrap();
    model.tick(t0, 0.0).unwrap();
    render.pump();

    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&hits);
    model.input_mut().subscribe(EventTopic::PointerHit, move |event| {
        if let InputEvent::PointerHit { hits } = event {
            sink.lock().extend(hits.iter().map(|hit| hit.handle));
        }
    });

    render.report_event(&InputEvent::PointerHit {
        hits: vec![
            PointerHit {
                handle,
                point: Vec3::new(0.5, 0.0, 0.5),
                layers: vec!["ground".into()],
            },
            PointerHit {
                handle: ObjectHandle(9999),
                point: Vec3::ZERO,
                layers: Vec::new(),
            },
        ],
    });
    render.report_engine_move(handle, &GeometryUpdate::new().with_translation(Vec3::new(3.0, 0.0, 0.0)));
    render.tick(t0).unwrap();
    model.pump();

    assert_eq!(*hits.lock(), vec![handle]);
    let moves = strings.moves.lock();
    assert_eq!(moves.len(), 1);
    assert_eq!(
        moves[0].translation,
        Some(AxisUpdate::smooth(Vec3::new(3.0, 0.0, 0.0)))
    );
}

#[test]
fn test_ping_round_trip() {
    let (mut model, mut render) = memory_pair();
    model.ping().unwrap();
    render.pump();
    render.tick(Instant::now()).unwrap();
    model.pump();
    assert!(model.last_round_trip_ms().unwrap() >= 0);
}

#[test]
fn test_dropped_link_closes_model() {
    let (mut model, render) = memory_pair();
    model
        .create_object(puppet().0, ObjectSpec::new(ObjectHandle(0), "ball"))
        .unwrap();
    drop(render);
    model.pump();
    assert_eq!(model.state(), SessionState::Closed);
    assert_eq!(model.pawn_count(), 0);
}

#[test]
fn test_camera_alias_over_text() {
    let (_model, mut render) = memory_pair();
    let mut args = vec!["camera".to_owned()];
    args.extend(
        GeometryUpdate::new()
            .with_translation_snap(Vec3::new(0.0, 10.0, 0.0))
            .to_text_args()
            .iter()
            .map(tether_bridge::Arg::to_wire),
    );
    let command = tether_bridge::Command::new("updateGeometry", args);
    render.handle_frame(&InboundFrame::now(Frame::Text(command.encode())));
    assert_eq!(
        render.scene().get(ObjectHandle::CAMERA).unwrap().transform.translation,
        Vec3::new(0.0, 10.0, 0.0)
    );
}

#[test]
fn test_session_over_tcp_loopback() {
    let config = BridgeConfig {
        address: "127.0.0.1:0".into(),
        ..BridgeConfig::default()
    };
    let listener = BridgeListener::bind(config.address.as_str(), config.transport()).unwrap();
    let addr = listener.local_addr().unwrap();

    let client = BridgeTransport::connect(addr, config.transport()).unwrap();
    let server = listener.accept().unwrap();

    let mut render = RenderBridge::new(server, MemoryScene::new(), &config);
    let mut model = ModelBridge::new(client, &config);
    render.start().unwrap();

    assert!(eventually(|| {
        model.pump();
        model.state() == SessionState::Credentialed
    }));
    model.announce_session_running("tcp-view").unwrap();

    let (pawn, strings) = puppet();
    strings.transform.lock().translation = Vec3::new(1.0, 2.0, 3.0);
    let handle = model
        .create_object(pawn, ObjectSpec::new(ObjectHandle(0), "primitiveCube"))
        .unwrap();
    model.tick(Instant::now(), 0.0).unwrap();

    assert!(eventually(|| {
        render.pump();
        render.scene().get(handle).is_some_and(|object| {
            object.transform.translation == Vec3::new(1.0, 2.0, 3.0)
        })
    }));
    assert_eq!(render.view_id(), Some("tcp-view"));

    model.shutdown();
    assert!(eventually(|| {
        render.pump();
        render.state().is_closed() || render.object_count() == 0
    }));
}

#[test]
fn test_garbage_frame_is_dropped_not_fatal() {
    let (_model, mut render) = memory_pair();
    render.pump();
    assert_eq!(render.state(), SessionState::Running);

    let mut writer = ByteWriter::new();
    writer.write_bytes(b"not a header");
    render.handle_frame(&InboundFrame::now(Frame::Binary(writer.into_inner())));
    assert_eq!(render.stats().current().decode_faults, 1);
    render.handle_frame(&InboundFrame::now(Frame::Text("abc\x02def".into())));
    assert_eq!(render.stats().current().decode_faults, 2);
    assert_eq!(render.state(), SessionState::Running);

    let spec = ObjectSpec::new(ObjectHandle(120), "primitiveCube");
    render.handle_frame(&InboundFrame::now(Frame::Text(format!(
        "makeObject\x01{}",
        spec.to_json().unwrap()
    ))));
    assert!(render.has_object(ObjectHandle(120)));
    assert_eq!(render.stats().current().decode_faults, 2);
}
