//! Presentation boundary: where replicated and predicted poses end up.

use std::collections::HashMap;

use glam::{EulerRot, Mat4, Quat, Vec3};
use hopper::normalize_yaw;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u32);

pub trait Presentation {
    fn create_entity(&mut self, name: &str, position: Vec3, rotation: f32) -> ObjectHandle;

    fn destroy_entity(&mut self, handle: ObjectHandle);

    fn set_transform(&mut self, handle: ObjectHandle, position: Vec3, rotation: f32);

    /// Position and yaw currently applied to `handle`.
    fn decompose_transform(&self, handle: ObjectHandle) -> Option<(Vec3, f32)>;
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub transform: Mat4,
}

fn yaw_transform(position: Vec3, rotation: f32) -> Mat4 {
    Mat4::from_rotation_translation(Quat::from_rotation_z(rotation), position)
}

/// In-memory scene graph holding one transform per object.
#[derive(Debug, Default)]
pub struct SceneGraph {
    objects: HashMap<ObjectHandle, SceneObject>,
    next_handle: u32,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.objects.get(&handle)
    }

    pub fn find(&self, name: &str) -> Option<ObjectHandle> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(handle, _)| *handle)
    }

    pub fn position(&self, handle: ObjectHandle) -> Option<Vec3> {
        self.decompose_transform(handle).map(|(position, _)| position)
    }
}

impl Presentation for SceneGraph {
    fn create_entity(&mut self, name: &str, position: Vec3, rotation: f32) -> ObjectHandle {
        let handle = ObjectHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(
            handle,
            SceneObject {
                name: name.to_string(),
                transform: yaw_transform(position, rotation),
            },
        );
        handle
    }

    fn destroy_entity(&mut self, handle: ObjectHandle) {
        self.objects.remove(&handle);
    }

    fn set_transform(&mut self, handle: ObjectHandle, position: Vec3, rotation: f32) {
        if let Some(object) = self.objects.get_mut(&handle) {
            object.transform = yaw_transform(position, rotation);
        }
    }

    fn decompose_transform(&self, handle: ObjectHandle) -> Option<(Vec3, f32)> {
        let object = self.objects.get(&handle)?;
        let (_, rotation, translation) = object.transform.to_scale_rotation_translation();
        let (yaw, _, _) = rotation.to_euler(EulerRot::ZYX);
        Some((translation, normalize_yaw(yaw)))
    }
}
