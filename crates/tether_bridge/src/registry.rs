//! # Object Registry
//!
//! Handle-indexed table of live cross-process objects.
//!
//! The registry holds whatever local representation an endpoint keeps for an
//! object: a pawn on the model side, a scene node on the render side. It does
//! not model hierarchy; parenting lives in the scene graph.
//!
//! A miss is normal. Messages can arrive for objects that were destroyed a
//! moment ago, so lookups return `Option` and callers skip.

use std::collections::BTreeMap;

use tether_shared::constants::CAMERA_ALIAS;
use tether_shared::ObjectHandle;

use crate::error::DecodeError;

/// Handle → representation table.
///
/// Iteration is in handle order, which keeps per-flush output deterministic.
#[derive(Debug, Clone)]
pub struct ObjectRegistry<R> {
    entries: BTreeMap<ObjectHandle, R>,
}

impl<R> ObjectRegistry<R> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers `representation` under `handle`.
    ///
    /// A `None` representation registers nothing and hands the handle back
    /// in `Err` for the caller to log. A live entry under the same handle is
    /// replaced and returned in `Ok`.
    pub fn create(
        &mut self,
        handle: ObjectHandle,
        representation: Option<R>,
    ) -> Result<Option<R>, ObjectHandle> {
        match representation {
            Some(rep) => Ok(self.entries.insert(handle, rep)),
            None => Err(handle),
        }
    }

    /// Registers `representation`, replacing any previous entry.
    pub fn insert(&mut self, handle: ObjectHandle, representation: R) -> Option<R> {
        self.entries.insert(handle, representation)
    }

    /// Looks up a representation.
    #[inline]
    #[must_use]
    pub fn lookup(&self, handle: ObjectHandle) -> Option<&R> {
        self.entries.get(&handle)
    }

    /// Looks up a representation mutably.
    #[inline]
    pub fn lookup_mut(&mut self, handle: ObjectHandle) -> Option<&mut R> {
        self.entries.get_mut(&handle)
    }

    /// Removes an entry, returning it if it was live.
    pub fn destroy(&mut self, handle: ObjectHandle) -> Option<R> {
        self.entries.remove(&handle)
    }

    /// True if `handle` is live.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of live entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.entries.keys().copied()
    }

    /// Iterates entries in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &R)> {
        self.entries.iter().map(|(h, r)| (*h, r))
    }

    /// Iterates entries mutably in handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectHandle, &mut R)> {
        self.entries.iter_mut().map(|(h, r)| (*h, r))
    }

    /// Removes every entry, returning them in handle order.
    pub fn drain(&mut self) -> Vec<(ObjectHandle, R)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

impl<R> Default for ObjectRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a wire handle: reserved names map to fixed handles, anything
/// else must be a decimal handle.
pub fn resolve_alias(name: &str) -> Result<ObjectHandle, DecodeError> {
    if name == CAMERA_ALIAS {
        return Ok(ObjectHandle::CAMERA);
    }
    name.trim()
        .parse::<ObjectHandle>()
        .map_err(|_| DecodeError::InvalidHandle(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shared::HandleAllocator;

    #[test]
    fn test_create_lookup_destroy() {
        let mut registry = ObjectRegistry::new();
        assert_eq!(registry.create(ObjectHandle(101), Some("cube")), Ok(None));
        assert_eq!(registry.lookup(ObjectHandle(101)), Some(&"cube"));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.destroy(ObjectHandle(101)), Some("cube"));
        assert_eq!(registry.lookup(ObjectHandle(101)), None);
        assert_eq!(registry.destroy(ObjectHandle(101)), None);
    }

    #[test]
    fn test_create_without_representation_is_rejected() {
        let mut registry: ObjectRegistry<u8> = ObjectRegistry::new();
        assert_eq!(registry.create(ObjectHandle(5), None), Err(ObjectHandle(5)));
        assert!(!registry.contains(ObjectHandle(5)));
    }

    #[test]
    fn test_iteration_is_in_handle_order() {
        let mut registry = ObjectRegistry::new();
        for h in [300, 101, 200] {
            registry.insert(ObjectHandle(h), h);
        }
        let handles: Vec<u32> = registry.handles().map(ObjectHandle::get).collect();
        assert_eq!(handles, vec![101, 200, 300]);
    }

    #[test]
    fn test_camera_alias_is_stable() {
        let mut allocator = HandleAllocator::new();
        let before = resolve_alias("camera").unwrap();
        for _ in 0..500 {
            let handle = allocator.allocate().unwrap();
            assert_ne!(handle, before);
        }
        assert_eq!(resolve_alias("camera").unwrap(), ObjectHandle::CAMERA);
        assert_eq!(before, ObjectHandle::CAMERA);
    }

    #[test]
    fn test_literal_handles_pass_through() {
        assert_eq!(resolve_alias("117").unwrap(), ObjectHandle(117));
        assert_eq!(resolve_alias("1").unwrap(), ObjectHandle::CAMERA);
        assert!(matches!(
            resolve_alias("cube"),
            Err(DecodeError::InvalidHandle(_))
        ));
    }
}
