//! # Pawn Capabilities
//!
//! A pawn is the model side's stand-in for one render-side object. Instead
//! of a behaviour chain, a pawn exposes optional capabilities:
//!
//! ```text
//! ┌──────────────┐   spatial()       ┌──────────────────┐
//! │     Pawn     │ ────────────────▶ │   SpatialPawn    │  geometry deltas
//! │              │   engine_moves()  ├──────────────────┤
//! │              │ ────────────────▶ │   EngineMoves    │  moves from engine
//! └──────────────┘                   └──────────────────┘
//! ```
//!
//! The bridge asks "does this pawn report geometry?" through `spatial()`
//! rather than assuming it.

use tether_shared::{Quaternion, Transform, Vec3};

use crate::protocol::{AxisUpdate, GeometryUpdate};

/// Rotation change that counts as movement.
pub const ROTATION_EPSILON: f32 = 1e-4;

/// Translation change that counts as movement.
pub const TRANSLATION_EPSILON: f32 = 0.01;

/// Scale change that counts as movement, as a fraction of the smallest
/// scale component.
pub const SCALE_FRACTION: f32 = 0.01;

/// A model-side object with a render-side counterpart.
pub trait Pawn: Send {
    /// Component names the render side should attach.
    fn component_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Geometry-delta reporting, if this pawn moves.
    fn spatial(&mut self) -> Option<&mut dyn SpatialPawn> {
        None
    }

    /// Accepts moves made by the engine, if this pawn allows them.
    fn engine_moves(&mut self) -> Option<&mut dyn EngineMoves> {
        None
    }

    /// Called once the render side has confirmed the object exists.
    fn view_ready(&mut self) {}
}

/// Reports geometry changes since the last report.
pub trait SpatialPawn {
    /// The change since the last call, or `None` if nothing moved enough.
    /// Only called once the render side is ready for the object.
    fn geometry_update_if_needed(&mut self) -> Option<GeometryUpdate>;
}

/// Receives geometry changed on the render side.
pub trait EngineMoves {
    /// Applies an `objectMoved` update.
    fn apply_engine_move(&mut self, update: &GeometryUpdate);
}

/// Change detection behind [`SpatialPawn`].
///
/// Every axis is a snap the first time it is reported. After that, an
/// unsmoothed tracker always snaps, and a smoothed one snaps only when
/// asked to via the `snap_*` methods.
#[derive(Clone, Debug, Default)]
pub struct SpatialTracker {
    smoothed: bool,
    last_scale: Option<Vec3>,
    last_rotation: Option<Quaternion>,
    last_translation: Option<Vec3>,
    snap_scale: bool,
    snap_rotation: bool,
    snap_translation: bool,
}

impl SpatialTracker {
    /// A tracker whose updates always snap.
    #[must_use]
    pub const fn unsmoothed() -> Self {
        Self {
            smoothed: false,
            last_scale: None,
            last_rotation: None,
            last_translation: None,
            snap_scale: true,
            snap_rotation: true,
            snap_translation: true,
        }
    }

    /// A tracker whose updates are smoothed unless flagged.
    #[must_use]
    pub const fn smoothed() -> Self {
        Self {
            smoothed: true,
            last_scale: None,
            last_rotation: None,
            last_translation: None,
            snap_scale: false,
            snap_rotation: false,
            snap_translation: false,
        }
    }

    /// True for a smoothed tracker.
    #[must_use]
    pub const fn is_smoothed(&self) -> bool {
        self.smoothed
    }

    /// Makes the next scale report a snap.
    pub fn snap_scale(&mut self) {
        self.snap_scale = true;
    }

    /// Makes the next rotation report a snap.
    pub fn snap_rotation(&mut self) {
        self.snap_rotation = true;
    }

    /// Makes the next translation report a snap.
    pub fn snap_translation(&mut self) {
        self.snap_translation = true;
    }

    /// Compares `current` with what was last reported and returns the axes
    /// that moved past their thresholds.
    pub fn update_if_needed(&mut self, current: &Transform) -> Option<GeometryUpdate> {
        let mut update = GeometryUpdate::new();

        let scale_epsilon = current.scale.min_abs() * SCALE_FRACTION;
        if !self
            .last_scale
            .is_some_and(|last| last.approx_eq(current.scale, scale_epsilon))
        {
            let snap = self.snap_scale || self.last_scale.is_none();
            self.last_scale = Some(current.scale);
            update.scale = Some(axis(current.scale, snap));
        }

        if !self
            .last_rotation
            .is_some_and(|last| last.approx_eq(current.rotation, ROTATION_EPSILON))
        {
            let snap = self.snap_rotation || self.last_rotation.is_none();
            self.last_rotation = Some(current.rotation);
            update.rotation = Some(axis(current.rotation, snap));
        }

        if !self
            .last_translation
            .is_some_and(|last| last.approx_eq(current.translation, TRANSLATION_EPSILON))
        {
            let snap = self.snap_translation || self.last_translation.is_none();
            self.last_translation = Some(current.translation);
            update.translation = Some(axis(current.translation, snap));
        }

        let always_snap = !self.smoothed;
        self.snap_scale = always_snap;
        self.snap_rotation = always_snap;
        self.snap_translation = always_snap;

        (!update.is_empty()).then_some(update)
    }

    /// Forgets what was reported, so the next report is a full snap.
    pub fn reset(&mut self) {
        self.last_scale = None;
        self.last_rotation = None;
        self.last_translation = None;
    }
}

const fn axis<T>(value: T, snap: bool) -> AxisUpdate<T> {
    if snap {
        AxisUpdate::snap(value)
    } else {
        AxisUpdate::smooth(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32) -> Transform {
        Transform::new(Vec3::ONE, Quaternion::IDENTITY, Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_first_report_snaps_every_axis() {
        let mut tracker = SpatialTracker::smoothed();
        let update = tracker.update_if_needed(&at(0.0)).unwrap();
        assert!(update.scale.unwrap().snap);
        assert!(update.rotation.unwrap().snap);
        assert!(update.translation.unwrap().snap);
    }

    #[test]
    fn test_small_moves_are_not_reported() {
        let mut tracker = SpatialTracker::smoothed();
        tracker.update_if_needed(&at(0.0));
        assert_eq!(tracker.update_if_needed(&at(0.005)), None);
    }

    #[test]
    fn test_smoothed_reports_smooth_after_first() {
        let mut tracker = SpatialTracker::smoothed();
        tracker.update_if_needed(&at(0.0));
        let update = tracker.update_if_needed(&at(1.0)).unwrap();
        assert_eq!(update.translation, Some(AxisUpdate::smooth(Vec3::new(1.0, 0.0, 0.0))));
        assert!(update.scale.is_none());
        assert!(update.rotation.is_none());
    }

    #[test]
    fn test_smoothed_snaps_when_flagged_once() {
        let mut tracker = SpatialTracker::smoothed();
        tracker.update_if_needed(&at(0.0));
        tracker.snap_translation();
        assert!(tracker.update_if_needed(&at(5.0)).unwrap().translation.unwrap().snap);
        assert!(!tracker.update_if_needed(&at(6.0)).unwrap().translation.unwrap().snap);
    }

    #[test]
    fn test_unsmoothed_always_snaps() {
        let mut tracker = SpatialTracker::unsmoothed();
        tracker.update_if_needed(&at(0.0));
        assert!(tracker.update_if_needed(&at(1.0)).unwrap().translation.unwrap().snap);
        assert!(tracker.update_if_needed(&at(2.0)).unwrap().translation.unwrap().snap);
    }

    #[test]
    fn test_scale_threshold_is_relative() {
        let mut tracker = SpatialTracker::smoothed();
        let mut transform = Transform::new(Vec3::new(10.0, 10.0, 10.0), Quaternion::IDENTITY, Vec3::ZERO);
        tracker.update_if_needed(&transform);
        transform.scale = Vec3::new(10.05, 10.0, 10.0);
        assert_eq!(tracker.update_if_needed(&transform), None);
        transform.scale = Vec3::new(10.2, 10.0, 10.0);
        assert!(tracker.update_if_needed(&transform).unwrap().scale.is_some());
    }

    #[test]
    fn test_reset_resnaps() {
        let mut tracker = SpatialTracker::smoothed();
        tracker.update_if_needed(&at(0.0));
        tracker.reset();
        assert!(tracker.update_if_needed(&at(0.0)).unwrap().translation.unwrap().snap);
    }
}
