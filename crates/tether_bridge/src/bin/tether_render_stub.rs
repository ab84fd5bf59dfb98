//! # Headless Render Stub
//!
//! Stands in for the engine: listens, accepts one model connection, applies
//! everything to an in-memory scene and answers like an engine would.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=tether=debug tether_render_stub [config.toml]
//! ```

use std::time::{Duration, Instant};

use tether_bridge::{BridgeConfig, BridgeListener, MemoryScene, RenderBridge};
use tracing_subscriber::EnvFilter;

const FRAME_TIME: Duration = Duration::from_millis(16);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        tracing::error!("render stub failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TETHER RENDER STUB                                       ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    let listener = BridgeListener::bind(config.address.as_str(), config.transport())?;
    tracing::info!("listening on {}", listener.local_addr()?);
    let transport = listener.accept()?;
    tracing::info!("model connected from {}", transport.peer_addr());

    let mut bridge = RenderBridge::new(transport, MemoryScene::new(), &config);
    bridge.start()?;

    let started = Instant::now();
    let mut frames = 0u64;
    loop {
        let frame_start = Instant::now();
        bridge.pump();
        if bridge.state().is_closed() || bridge.shutdown_requested() {
            break;
        }
        bridge.tick(frame_start)?;
        frames += 1;

        let spent = frame_start.elapsed();
        if spent < FRAME_TIME {
            std::thread::sleep(FRAME_TIME - spent);
        }
    }

    println!();
    println!("┌─ SUMMARY ───────────────────────────────────────────────────────┐");
    println!("│ Frames:        {frames:<48} │");
    println!("│ Objects left:  {:<48} │", bridge.object_count());
    println!("│ Session time:  {:<48} │", format!("{:?}", bridge.session_time()));
    println!("│ Wall time:     {:<48} │", format!("{:.1}s", started.elapsed().as_secs_f64()));
    println!("└─────────────────────────────────────────────────────────────────┘");
    Ok(())
}
