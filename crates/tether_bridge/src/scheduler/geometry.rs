//! Explicit geometry updates waiting for the next geometry flush.

use std::collections::BTreeMap;

use tether_shared::ObjectHandle;

use crate::protocol::{GeometryRecord, GeometryUpdate};

/// Latest merged update per handle.
///
/// Never bounded: a second update for the same handle merges in place.
#[derive(Debug, Default, Clone)]
pub struct GeometryQueue {
    pending: BTreeMap<ObjectHandle, GeometryUpdate>,
}

impl GeometryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    /// Merges `update` into whatever is pending for `handle`.
    pub fn record(&mut self, handle: ObjectHandle, update: &GeometryUpdate) {
        if update.is_empty() {
            return;
        }
        self.pending
            .entry(handle)
            .and_modify(|pending| pending.merge(update))
            .or_insert(*update);
    }

    /// Drops the pending update for `handle`, if any.
    pub fn purge(&mut self, handle: ObjectHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Pending update for `handle`.
    #[must_use]
    pub fn get(&self, handle: ObjectHandle) -> Option<&GeometryUpdate> {
        self.pending.get(&handle)
    }

    /// Empties the queue, returning one record per handle.
    pub fn take(&mut self) -> Vec<GeometryRecord> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(handle, update)| GeometryRecord::new(handle, update))
            .collect()
    }

    /// Handles with a pending update.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AxisUpdate;
    use tether_shared::{Quaternion, Vec3};

    #[test]
    fn test_disjoint_updates_merge_to_union() {
        let mut queue = GeometryQueue::new();
        let h = ObjectHandle(120);
        queue.record(h, &GeometryUpdate::new().with_scale(Vec3::ONE));
        queue.record(h, &GeometryUpdate::new().with_rotation(Quaternion::IDENTITY));

        let pending = queue.get(h).unwrap();
        assert!(pending.scale.is_some());
        assert!(pending.rotation.is_some());
        assert!(pending.translation.is_none());
    }

    #[test]
    fn test_later_update_wins_per_axis() {
        let mut queue = GeometryQueue::new();
        let h = ObjectHandle(7);
        queue.record(h, &GeometryUpdate::new().with_translation(Vec3::new(1.0, 0.0, 0.0)));
        queue.record(h, &GeometryUpdate::new().with_translation_snap(Vec3::new(2.0, 0.0, 0.0)));

        let records = queue.take();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].update.translation,
            Some(AxisUpdate::snap(Vec3::new(2.0, 0.0, 0.0)))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_snap_then_smooth_keeps_smooth() {
        let mut queue = GeometryQueue::new();
        let h = ObjectHandle(9);
        queue.record(h, &GeometryUpdate::new().with_scale_snap(Vec3::ONE));
        queue.record(h, &GeometryUpdate::new().with_scale(Vec3::ZERO));
        assert_eq!(queue.get(h).unwrap().scale, Some(AxisUpdate::smooth(Vec3::ZERO)));
    }

    #[test]
    fn test_empty_update_is_ignored_and_purge() {
        let mut queue = GeometryQueue::new();
        queue.record(ObjectHandle(3), &GeometryUpdate::new());
        assert!(queue.is_empty());

        queue.record(ObjectHandle(3), &GeometryUpdate::new().with_scale(Vec3::ONE));
        assert!(queue.purge(ObjectHandle(3)));
        assert!(!queue.purge(ObjectHandle(3)));
        assert!(queue.take().is_empty());
    }
}
