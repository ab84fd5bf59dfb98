//! # Tether Bridge
//!
//! Couples a deterministic simulation (the model side) to a render engine
//! (the render side) over one local socket.
//!
//! ## Architecture
//!
//! - **Protocol**: SOH/STX-separated text commands and bundles, plus binary
//!   geometry batches with per-record presence/snap bits
//! - **Scheduler**: per-handle deferred commands and merged geometry,
//!   flushed on independent throttles
//! - **Clock**: the render side estimates model virtual time from beacons
//! - **Registry**: handle-indexed objects on both sides; misses are normal
//! - **Transport**: length-prefixed TCP frames read on their own thread
//!
//! ## Data Flow
//!
//! ```text
//!  MODEL SIDE                                     RENDER SIDE
//!  pawns ──▶ DeferredScheduler ──┐          ┌──▶ DispatchTable ──▶ SceneGraph
//!                                ├─ socket ─┤
//!  EventBus ◀── DispatchTable ◀──┘          └─── outbox ◀── acks, moves, input
//! ```
//!
//! ## Threading
//!
//! Each endpoint is driven from one tick thread. The transport's reader
//! thread only decodes transport frames and hands them over a bounded
//! channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_bridge::{BridgeConfig, BridgeTransport, ModelBridge};
//!
//! let config = BridgeConfig::load("tether.toml")?;
//! let link = BridgeTransport::connect(&config.address, config.transport())?;
//! let mut bridge = ModelBridge::new(link, &config);
//! loop {
//!     bridge.pump();
//!     bridge.tick(Instant::now(), virtual_time_ms)?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod logging;
pub mod model;
pub mod object_spec;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod transport;

// Re-exports for convenience
pub use clock::{BeaconSchedule, ClockReconciler};
pub use config::BridgeConfig;
pub use dispatch::{DispatchTable, Dispatched, FallbackHandler, Handler, HandlerClass};
pub use error::{BridgeError, BridgeResult, ConfigError, DecodeError, TransportError};
pub use logging::{LogOptions, LogTier, MeasureCategory, MeasureOptions, Measurement, TierLogger};
pub use model::{EngineMoves, ModelBridge, Pawn, SpatialPawn, SpatialTracker};
pub use object_spec::ObjectSpec;
pub use protocol::{Arg, AxisUpdate, Command, Frame, GeometryRecord, GeometryUpdate};
pub use registry::ObjectRegistry;
pub use render::{MemoryScene, RenderBridge, SceneGraph};
pub use scheduler::{DeferredScheduler, SchedulerConfig};
pub use session::{SessionCredentials, SessionState};
pub use stats::{MessageStats, SetupStats, StatsReport};
pub use transport::{
    BridgeListener, BridgeTransport, FrameSink, FrameSource, MemoryLink, TransportConfig,
    TransportEvent,
};

pub use tether_shared::{InputEvent, ObjectHandle, Quaternion, Transform, Vec3};
