//! Cross-process object handles.
//!
//! A handle is the only identity an object has on the wire. Both endpoints
//! use the same integer for the same object; the decimal string form exists
//! only at the text-frame boundary.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{CAMERA_HANDLE, HANDLE_BITS, RESERVED_HANDLE_LIMIT};

/// Identifier of a live cross-process object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    /// The reserved camera handle.
    pub const CAMERA: Self = Self(CAMERA_HANDLE);

    /// Largest handle that still fits in a binary geometry header.
    pub const MAX: Self = Self((1 << HANDLE_BITS) - 1);

    /// Raw integer value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true for handles in the well-known singleton range.
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 < RESERVED_HANDLE_LIMIT
    }

    /// Returns true if the handle can be packed into a geometry header.
    #[inline]
    #[must_use]
    pub const fn fits_geometry_header(self) -> bool {
        self.0 <= Self::MAX.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle string that is not a decimal integer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid handle {input:?}: {source}")]
pub struct HandleParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    #[source]
    pub source: ParseIntError,
}

impl FromStr for ObjectHandle {
    type Err = HandleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self).map_err(|source| HandleParseError {
            input: s.to_string(),
            source,
        })
    }
}

impl From<u32> for ObjectHandle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Monotonic handle allocator for the side that originates objects.
///
/// Handles are never recycled, so a handle cannot be reused while a deferred
/// message or geometry record still names it.
#[derive(Clone, Debug)]
pub struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    /// Creates an allocator whose first handle is the first non-reserved one.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: RESERVED_HANDLE_LIMIT }
    }

    /// Allocates the next handle, or `None` once the header space is exhausted.
    pub fn allocate(&mut self) -> Option<ObjectHandle> {
        let handle = ObjectHandle(self.next);
        if !handle.fits_geometry_header() {
            return None;
        }
        self.next += 1;
        Some(handle)
    }

    /// Number of handles handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.next - RESERVED_HANDLE_LIMIT
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
