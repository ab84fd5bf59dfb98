//! # Model Simulator
//!
//! Connects to a render endpoint, waits for the session triad, then spawns a
//! ring of orbiting cubes and streams their geometry for a while.
//!
//! ## Usage
//!
//! ```bash
//! tether_model_sim [config.toml] --objects 200 --seconds 10
//! ```

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use tether_bridge::{
    BridgeConfig, BridgeTransport, ModelBridge, ObjectHandle, ObjectSpec, Pawn, Quaternion,
    SpatialPawn, SpatialTracker, Transform, Vec3,
};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(16);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// A cube circling the origin.
struct Orbiter {
    origin: Instant,
    radius: f32,
    phase: f32,
    /// Radians per second.
    speed: f32,
    tracker: SpatialTracker,
}

impl Orbiter {
    fn transform(&self) -> Transform {
        let angle = self.phase + self.speed * self.origin.elapsed().as_secs_f32();
        let translation = Vec3::new(self.radius * angle.cos(), 0.0, self.radius * angle.sin());
        let half = angle * 0.5;
        let rotation = Quaternion::new(0.0, half.sin(), 0.0, half.cos());
        Transform::new(Vec3::ONE, rotation, translation)
    }
}

impl SpatialPawn for Orbiter {
    fn geometry_update_if_needed(&mut self) -> Option<tether_bridge::GeometryUpdate> {
        let current = self.transform();
        self.tracker.update_if_needed(&current)
    }
}

impl Pawn for Orbiter {
    fn component_names(&self) -> Vec<String> {
        vec!["Orbiter".to_owned()]
    }

    fn spatial(&mut self) -> Option<&mut dyn SpatialPawn> {
        Some(self)
    }
}

struct Args {
    config: BridgeConfig,
    objects: usize,
    seconds: u64,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut parsed = Args {
        config: BridgeConfig::default(),
        objects: 100,
        seconds: 10,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--objects" | "-n" => {
                i += 1;
                parsed.objects = args.get(i).ok_or("--objects needs a value")?.parse()?;
            }
            "--seconds" | "-s" => {
                i += 1;
                parsed.seconds = args.get(i).ok_or("--seconds needs a value")?.parse()?;
            }
            path => parsed.config = BridgeConfig::load(path)?,
        }
        i += 1;
    }
    Ok(parsed)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        tracing::error!("model sim failed: {err}");
        std::process::exit(1);
    }
}

#[allow(clippy::cast_precision_loss)]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Args {
        config,
        objects,
        seconds,
    } = parse_args()?;

    let transport = BridgeTransport::connect(config.address.as_str(), config.transport())?;
    let mut bridge = ModelBridge::new(transport, &config);

    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    while !bridge.state().accepts_traffic() {
        if bridge.state().is_closed() || Instant::now() > deadline {
            return Err("render side never sent readyForSession".into());
        }
        bridge.pump();
        std::thread::sleep(TICK);
    }
    bridge.announce_session_running("model-sim")?;

    let origin = Instant::now();
    for i in 0..objects {
        let orbiter = Orbiter {
            origin,
            radius: 5.0 + (i % 10) as f32,
            phase: TAU * i as f32 / objects.max(1) as f32,
            speed: 0.5 + (i % 3) as f32 * 0.25,
            tracker: SpatialTracker::smoothed(),
        };
        let spec = ObjectSpec::new(ObjectHandle(0), "primitiveCube")
            .with_transform(orbiter.transform())
            .confirmed();
        bridge.create_object(Box::new(orbiter), spec)?;
    }
    tracing::info!("spawned {objects} orbiters");

    let run_for = Duration::from_secs(seconds);
    let mut last_ping = origin;
    while origin.elapsed() < run_for && !bridge.shutdown_requested() {
        let now = Instant::now();
        bridge.pump();
        if bridge.state().is_closed() {
            break;
        }
        let virtual_time_ms = origin.elapsed().as_secs_f64() * 1000.0;
        bridge.tick(now, virtual_time_ms)?;
        if now.duration_since(last_ping) >= PING_INTERVAL {
            last_ping = now;
            bridge.ping()?;
        }
        std::thread::sleep(TICK);
    }

    println!("object setup times (ms bucket:count): {}", bridge.take_setup_summary());
    if let Some(rtt) = bridge.last_round_trip_ms() {
        println!("last round trip: {rtt}ms");
    }
    bridge.shutdown();
    Ok(())
}
