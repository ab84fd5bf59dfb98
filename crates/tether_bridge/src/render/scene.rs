//! Scene graph seam for the render endpoint.
//!
//! The bridge never touches engine objects directly. It drives a
//! [`SceneGraph`], which an engine binding implements. [`MemoryScene`] is the
//! headless implementation used by the stub binary and the tests.

use std::collections::HashMap;

use tether_shared::{ObjectHandle, Transform, Vec3};

use crate::object_spec::ObjectSpec;
use crate::protocol::{AxisUpdate, GeometryUpdate};

/// Fraction of the remaining distance a smoothed axis covers per step.
pub const SMOOTHING_FACTOR: f32 = 0.2;

/// What the render endpoint needs from an engine.
pub trait SceneGraph {
    /// Instantiates an object. Returns false if the engine could not (for
    /// example an unknown prefab name).
    fn spawn(&mut self, handle: ObjectHandle, spec: &ObjectSpec, active: bool) -> bool;

    /// Removes an object and detaches its children.
    fn despawn(&mut self, handle: ObjectHandle);

    /// Reparents `child`; `None` detaches it.
    fn set_parent(&mut self, child: ObjectHandle, parent: Option<ObjectHandle>);

    /// Applies a geometry update. Snapped axes jump; others are smoothed.
    fn apply_geometry(&mut self, handle: ObjectHandle, update: &GeometryUpdate);

    /// Shows or hides an object.
    fn set_active(&mut self, handle: ObjectHandle, active: bool);

    /// Advances smoothing by one frame.
    fn step(&mut self) {}
}

/// One object in a [`MemoryScene`].
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    /// Prefab or primitive name.
    pub kind: String,
    /// Attached component names.
    pub components: Vec<String>,
    /// Current local transform.
    pub transform: Transform,
    /// Where smoothing is heading.
    pub target: Transform,
    /// Parent, if attached.
    pub parent: Option<ObjectHandle>,
    /// Visible.
    pub active: bool,
}

impl SceneObject {
    fn new(kind: impl Into<String>, transform: Transform, active: bool) -> Self {
        Self {
            kind: kind.into(),
            components: Vec::new(),
            transform,
            target: transform,
            parent: None,
            active,
        }
    }
}

/// A headless scene: transforms in a map.
#[derive(Clone, Debug)]
pub struct MemoryScene {
    objects: HashMap<ObjectHandle, SceneObject>,
    /// Kinds `spawn` refuses.
    rejected_kinds: Vec<String>,
}

impl MemoryScene {
    /// Creates a scene holding only the camera.
    #[must_use]
    pub fn new() -> Self {
        let mut objects = HashMap::new();
        objects.insert(
            ObjectHandle::CAMERA,
            SceneObject::new("camera", Transform::IDENTITY, true),
        );
        Self {
            objects,
            rejected_kinds: Vec::new(),
        }
    }

    /// Makes `spawn` fail for `kind`.
    #[must_use]
    pub fn rejecting(mut self, kind: impl Into<String>) -> Self {
        self.rejected_kinds.push(kind.into());
        self
    }

    /// Looks up an object.
    #[must_use]
    pub fn get(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.objects.get(&handle)
    }

    /// Objects, camera included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Never true; the camera is always there.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Children of `parent`, unordered.
    #[must_use]
    pub fn children(&self, parent: ObjectHandle) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .filter(|(_, object)| object.parent == Some(parent))
            .map(|(handle, _)| *handle)
            .collect()
    }
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph for MemoryScene {
    fn spawn(&mut self, handle: ObjectHandle, spec: &ObjectSpec, active: bool) -> bool {
        if self.rejected_kinds.iter().any(|k| *k == spec.kind) {
            return false;
        }
        let mut object = SceneObject::new(spec.kind.clone(), spec.initial_transform(), active);
        object.components = spec.component_names().map(str::to_owned).collect();
        self.objects.insert(handle, object);
        true
    }

    fn despawn(&mut self, handle: ObjectHandle) {
        if handle == ObjectHandle::CAMERA || self.objects.remove(&handle).is_none() {
            return;
        }
        for object in self.objects.values_mut() {
            if object.parent == Some(handle) {
                object.parent = None;
            }
        }
    }

    fn set_parent(&mut self, child: ObjectHandle, parent: Option<ObjectHandle>) {
        if let Some(object) = self.objects.get_mut(&child) {
            object.parent = parent;
        }
    }

    fn apply_geometry(&mut self, handle: ObjectHandle, update: &GeometryUpdate) {
        let Some(object) = self.objects.get_mut(&handle) else {
            return;
        };
        if let Some(axis) = update.scale {
            apply_vec(&mut object.transform.scale, &mut object.target.scale, axis);
        }
        if let Some(AxisUpdate { value, snap }) = update.rotation {
            let value = value.normalize();
            object.target.rotation = value;
            if snap {
                object.transform.rotation = value;
            }
        }
        if let Some(axis) = update.translation {
            apply_vec(
                &mut object.transform.translation,
                &mut object.target.translation,
                axis,
            );
        }
    }

    fn set_active(&mut self, handle: ObjectHandle, active: bool) {
        if let Some(object) = self.objects.get_mut(&handle) {
            object.active = active;
        }
    }

    fn step(&mut self) {
        for object in self.objects.values_mut() {
            let (current, target) = (&mut object.transform, object.target);
            current.scale = current.scale.lerp(target.scale, SMOOTHING_FACTOR);
            current.rotation = current.rotation.nlerp(target.rotation, SMOOTHING_FACTOR);
            current.translation = current.translation.lerp(target.translation, SMOOTHING_FACTOR);
        }
    }
}

fn apply_vec(current: &mut Vec3, target: &mut Vec3, axis: AxisUpdate<Vec3>) {
    *target = axis.value;
    if axis.snap {
        *current = axis.value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shared::Quaternion;

    fn at(translation: Vec3) -> Transform {
        Transform::new(Vec3::ONE, Quaternion::IDENTITY, translation)
    }

    fn cube() -> ObjectSpec {
        ObjectSpec::new(ObjectHandle(150), "primitiveCube").with_components(["Spin", "Glow"])
    }

    #[test]
    fn test_spawn_uses_initial_transform() {
        let mut scene = MemoryScene::new();
        let spec = cube().with_transform(at(Vec3::new(1.0, 2.0, 3.0)));
        assert!(scene.spawn(ObjectHandle(150), &spec, false));
        let object = scene.get(ObjectHandle(150)).unwrap();
        assert_eq!(object.transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(object.components, vec!["Spin", "Glow"]);
        assert!(!object.active);
    }

    #[test]
    fn test_rejected_kind() {
        let mut scene = MemoryScene::new().rejecting("primitiveCube");
        assert!(!scene.spawn(ObjectHandle(150), &cube(), true));
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_snap_jumps_smooth_converges() {
        let mut scene = MemoryScene::new();
        scene.spawn(ObjectHandle(150), &cube(), true);

        scene.apply_geometry(
            ObjectHandle(150),
            &GeometryUpdate::new().with_translation_snap(Vec3::new(10.0, 0.0, 0.0)),
        );
        assert_eq!(
            scene.get(ObjectHandle(150)).unwrap().transform.translation,
            Vec3::new(10.0, 0.0, 0.0)
        );

        scene.apply_geometry(
            ObjectHandle(150),
            &GeometryUpdate::new().with_translation(Vec3::new(20.0, 0.0, 0.0)),
        );
        scene.step();
        let x = scene.get(ObjectHandle(150)).unwrap().transform.translation.x;
        assert!((x - 12.0).abs() < 1e-4);
        for _ in 0..100 {
            scene.step();
        }
        let object = scene.get(ObjectHandle(150)).unwrap();
        assert!(object.transform.translation.approx_eq(object.target.translation, 1e-3));
    }

    #[test]
    fn test_despawn_detaches_children_and_keeps_camera() {
        let mut scene = MemoryScene::new();
        scene.spawn(ObjectHandle(150), &cube(), true);
        scene.spawn(ObjectHandle(151), &cube(), true);
        scene.set_parent(ObjectHandle(151), Some(ObjectHandle(150)));
        assert_eq!(scene.children(ObjectHandle(150)), vec![ObjectHandle(151)]);

        scene.despawn(ObjectHandle(150));
        assert_eq!(scene.get(ObjectHandle(151)).unwrap().parent, None);

        scene.despawn(ObjectHandle::CAMERA);
        assert!(scene.get(ObjectHandle::CAMERA).is_some());
    }
}
