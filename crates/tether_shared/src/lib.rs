//! # Tether Shared
//!
//! Types both bridge endpoints agree on before any bytes move.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - sockets or the transport layer
//! - any engine or simulation type
//!
//! If you need wire encoding, put it in `tether_bridge`.

#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod handle;
pub mod math;

pub use constants::{
    BEACON_INTERVAL_MS, BUNDLE_SEPARATOR, CAMERA_HANDLE, DEFAULT_BRIDGE_ADDR,
    FIELD_SEPARATOR, GEOMETRY_FLUSH_INTERVAL_MS, HEADER_TERMINATOR,
    MESSAGE_FLUSH_INTERVAL_MS, RESERVED_HANDLE_LIMIT,
};
pub use events::{EventBus, EventTopic, InputEvent, PointerHit, SubscriptionId};
pub use handle::{HandleAllocator, HandleParseError, ObjectHandle};
pub use math::{Quaternion, Transform, Vec3};
