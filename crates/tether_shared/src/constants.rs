//! # Bridge Constants
//!
//! Values both endpoints must agree on before a session starts.
//!
//! **CRITICAL:** the separators and the camera handle are part of the wire
//! contract. Changing them breaks interop with every deployed peer.

// =============================================================================
// WIRE SEPARATORS
// =============================================================================

/// Separates the fields of one text command (SOH).
pub const FIELD_SEPARATOR: u8 = 0x01;

/// Separates the commands of a bundle, and the timestamp from the command
/// name in a binary header (STX).
pub const BUNDLE_SEPARATOR: u8 = 0x02;

/// Terminates the ASCII header of a binary frame (ETX).
pub const HEADER_TERMINATOR: u8 = 0x03;

/// [`FIELD_SEPARATOR`] as a `char`.
pub const FIELD_SEPARATOR_CHAR: char = '\x01';

/// [`BUNDLE_SEPARATOR`] as a `char`.
pub const BUNDLE_SEPARATOR_CHAR: char = '\x02';

// =============================================================================
// HANDLES
// =============================================================================

/// Handles below this value are reserved for well-known singletons.
pub const RESERVED_HANDLE_LIMIT: u32 = 100;

/// Reserved handle of the main camera.
pub const CAMERA_HANDLE: u32 = 1;

/// Wire name that aliases [`CAMERA_HANDLE`].
pub const CAMERA_ALIAS: &str = "camera";

/// Handles share a 32-bit word with six flag bits in binary geometry records.
pub const HANDLE_BITS: u32 = 26;

// =============================================================================
// TIMING
// =============================================================================

/// Default command-queue flush interval (every second update at 26 ms).
pub const MESSAGE_FLUSH_INTERVAL_MS: u64 = 45;

/// Default geometry-queue flush interval (every fourth update at 26 ms).
pub const GEOMETRY_FLUSH_INTERVAL_MS: u64 = 90;

/// Minimum spacing between two clock beacons.
pub const BEACON_INTERVAL_MS: u64 = 1000;

/// Message statistics reporting interval.
pub const STATS_INTERVAL_MS: u64 = 1000;

/// Render-side outbound bundle interval.
pub const RENDER_SEND_INTERVAL_MS: u64 = 50;

/// Weight of a fresh clock sample in the smoothed offset.
pub const CLOCK_SMOOTHING_WEIGHT: f64 = 0.2;

// =============================================================================
// NETWORK
// =============================================================================

/// Default bridge port.
pub const DEFAULT_BRIDGE_PORT: u16 = 5555;

/// Default bridge address (loopback only).
pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:5555";
