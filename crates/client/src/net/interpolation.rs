//! Smoothing of remote entities between the two latest authoritative poses.

use std::time::{Duration, Instant};

use hopper::time::signed_secs;
use hopper::world::SlotTable;
use hopper::{EntityId, MAX_ENTITIES, Pose, lerp_angle};

use crate::scene::{ObjectHandle, Presentation};

#[derive(Debug, Clone)]
pub struct NetworkEntity {
    pub id: EntityId,
    pub handle: ObjectHandle,
    pub previous: Pose,
    pub target: Pose,
    pub last_snapshot: Instant,
    /// Set once a frame has posed the presentation object.
    pub rendered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePose {
    Interpolate(f32),
    Hold,
    Skip,
}

/// Classifies `t`, the time since the last snapshot in tick periods.
pub fn frame_pose(t: f64) -> FramePose {
    if !(0.0..=2.0).contains(&t) {
        FramePose::Skip
    } else if t <= 1.0 {
        FramePose::Interpolate(t as f32)
    } else {
        FramePose::Hold
    }
}

pub fn interpolate(previous: &Pose, target: &Pose, t: f32) -> Pose {
    Pose::new(
        previous.position.lerp(target.position, t),
        lerp_angle(previous.rotation, target.rotation, t),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpolationStats {
    pub tracked: usize,
    pub interpolated: usize,
    pub held: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct InterpolationEngine {
    entities: SlotTable<NetworkEntity>,
    local_id: Option<EntityId>,
    tick_period: Duration,
    stats: InterpolationStats,
}

impl InterpolationEngine {
    pub fn new(tick_period: Duration) -> Self {
        Self {
            entities: SlotTable::with_capacity(MAX_ENTITIES),
            local_id: None,
            tick_period,
            stats: InterpolationStats::default(),
        }
    }

    pub fn set_local_id(&mut self, id: EntityId) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<EntityId> {
        self.local_id
    }

    pub fn active_count(&self) -> usize {
        self.entities.len()
    }

    pub fn get(&self, id: EntityId) -> Option<&NetworkEntity> {
        self.entities.get(id.index())
    }

    pub fn entities(&self) -> impl Iterator<Item = &NetworkEntity> {
        self.entities.iter().map(|(_, entity)| entity)
    }

    pub fn stats(&self) -> InterpolationStats {
        self.stats
    }

    /// Starts tracking a remote entity at `pose`.
    pub fn spawn<P: Presentation>(
        &mut self,
        scene: &mut P,
        id: EntityId,
        pose: Pose,
        now: Instant,
    ) -> bool {
        if self.local_id == Some(id) {
            return false;
        }
        if self.entities.contains(id.index()) {
            log::warn!("Entity {id} already tracked");
            return false;
        }
        if id.index() >= self.entities.capacity() {
            log::warn!("Entity {id} is beyond the tracking capacity");
            return false;
        }

        let handle = scene.create_entity(&format!("networkEntity{id}"), pose.position, pose.rotation);
        let entity = NetworkEntity {
            id,
            handle,
            previous: pose,
            target: pose,
            last_snapshot: now,
            rendered: false,
        };
        if let Err(entity) = self.entities.insert_at(id.index(), entity) {
            scene.destroy_entity(entity.handle);
            return false;
        }
        true
    }

    /// Retargets a tracked entity. Interpolation restarts from where the
    /// entity is currently drawn.
    pub fn apply_update<P: Presentation>(
        &mut self,
        scene: &P,
        id: EntityId,
        pose: Pose,
        now: Instant,
    ) -> bool {
        if self.local_id == Some(id) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(id.index()) else {
            log::warn!("Update for unknown entity {id}");
            return false;
        };

        entity.previous = if entity.rendered {
            scene
                .decompose_transform(entity.handle)
                .map(|(position, rotation)| Pose::new(position, rotation))
                .unwrap_or(entity.target)
        } else {
            entity.target
        };
        entity.target = pose;
        entity.last_snapshot = now;
        true
    }

    pub fn despawn<P: Presentation>(&mut self, scene: &mut P, id: EntityId) -> bool {
        match self.entities.remove(id.index()) {
            Some(entity) => {
                scene.destroy_entity(entity.handle);
                true
            }
            None => {
                log::warn!("Delete for unknown entity {id}");
                false
            }
        }
    }

    /// Poses every tracked entity for the frame at `now`.
    pub fn update<P: Presentation>(&mut self, scene: &mut P, now: Instant) {
        let period = self.tick_period.as_secs_f64().max(f64::EPSILON);
        let mut stats = InterpolationStats {
            tracked: self.entities.len(),
            ..Default::default()
        };

        for (_, entity) in self.entities.iter_mut() {
            let t = signed_secs(now, entity.last_snapshot) / period;
            let pose = match frame_pose(t) {
                FramePose::Interpolate(t) => {
                    stats.interpolated += 1;
                    interpolate(&entity.previous, &entity.target, t)
                }
                FramePose::Hold => {
                    stats.held += 1;
                    entity.target
                }
                FramePose::Skip => {
                    stats.skipped += 1;
                    continue;
                }
            };
            scene.set_transform(entity.handle, pose.position, pose.rotation);
            entity.rendered = true;
        }

        self.stats = stats;
    }

    /// Forgets every remote entity, e.g. after losing the server.
    pub fn clear<P: Presentation>(&mut self, scene: &mut P) {
        for (_, entity) in self.entities.iter() {
            scene.destroy_entity(entity.handle);
        }
        self.entities.clear();
        self.local_id = None;
        self.stats = InterpolationStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;
    use glam::Vec3;
    use hopper::TICK_PERIOD;

    fn pose(x: f32, rotation: f32) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), rotation)
    }

    fn drawn(scene: &SceneGraph, engine: &InterpolationEngine, id: u32) -> (Vec3, f32) {
        let handle = engine.get(EntityId(id)).unwrap().handle;
        scene.decompose_transform(handle).unwrap()
    }

    fn setup() -> (InterpolationEngine, SceneGraph, Instant) {
        let mut engine = InterpolationEngine::new(TICK_PERIOD);
        let mut scene = SceneGraph::new();
        let start = Instant::now();
        engine.set_local_id(EntityId(0));
        assert!(engine.spawn(&mut scene, EntityId(1), pose(0.0, 0.0), start));
        (engine, scene, start)
    }

    #[test]
    fn frame_pose_boundaries() {
        assert_eq!(frame_pose(-0.01), FramePose::Skip);
        assert_eq!(frame_pose(0.0), FramePose::Interpolate(0.0));
        assert_eq!(frame_pose(1.0), FramePose::Interpolate(1.0));
        assert_eq!(frame_pose(1.5), FramePose::Hold);
        assert_eq!(frame_pose(2.0), FramePose::Hold);
        assert_eq!(frame_pose(2.01), FramePose::Skip);
        assert_eq!(frame_pose(f64::NAN), FramePose::Skip);
    }

    #[test]
    fn spawn_names_object_and_skips_own_id() {
        let (mut engine, mut scene, start) = setup();

        assert!(scene.find("networkEntity1").is_some());
        assert!(!engine.spawn(&mut scene, EntityId(0), pose(0.0, 0.0), start));
        assert!(!engine.spawn(&mut scene, EntityId(1), pose(0.0, 0.0), start));
        assert_eq!(engine.active_count(), 1);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn interpolates_between_snapshots() {
        let (mut engine, mut scene, start) = setup();
        engine.apply_update(&scene, EntityId(1), pose(10.0, 1.0), start);

        engine.update(&mut scene, start);
        let (position, _) = drawn(&scene, &engine, 1);
        assert!(position.abs_diff_eq(Vec3::ZERO, 1e-5));

        engine.update(&mut scene, start + TICK_PERIOD / 2);
        let (position, rotation) = drawn(&scene, &engine, 1);
        assert!((position.x - 5.0).abs() < 1e-4);
        assert!((rotation - 0.5).abs() < 1e-4);

        engine.update(&mut scene, start + TICK_PERIOD);
        let (position, _) = drawn(&scene, &engine, 1);
        assert!((position.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn holds_at_target_then_stops_touching() {
        let (mut engine, mut scene, start) = setup();
        engine.apply_update(&scene, EntityId(1), pose(10.0, 0.0), start);

        engine.update(&mut scene, start + TICK_PERIOD * 3 / 2);
        let (position, _) = drawn(&scene, &engine, 1);
        assert_eq!(position.x, 10.0);
        assert_eq!(engine.stats().held, 1);

        let handle = engine.get(EntityId(1)).unwrap().handle;
        scene.set_transform(handle, Vec3::splat(7.0), 0.0);
        engine.update(&mut scene, start + TICK_PERIOD * 3);
        assert_eq!(engine.stats().skipped, 1);
        assert_eq!(drawn(&scene, &engine, 1).0, Vec3::splat(7.0));
    }

    #[test]
    fn snapshot_from_the_future_is_skipped() {
        let (mut engine, mut scene, start) = setup();
        engine.apply_update(&scene, EntityId(1), pose(4.0, 0.0), start + TICK_PERIOD);

        engine.update(&mut scene, start);
        assert_eq!(engine.stats().skipped, 1);
        assert!(!engine.get(EntityId(1)).unwrap().rendered);
    }

    #[test]
    fn retarget_starts_from_drawn_pose() {
        let (mut engine, mut scene, start) = setup();
        engine.apply_update(&scene, EntityId(1), pose(10.0, 0.0), start);
        engine.update(&mut scene, start + TICK_PERIOD / 2);

        let later = start + TICK_PERIOD / 2;
        engine.apply_update(&scene, EntityId(1), pose(20.0, 0.0), later);

        let entity = engine.get(EntityId(1)).unwrap();
        assert!((entity.previous.position.x - 5.0).abs() < 1e-4);
        assert_eq!(entity.target.position.x, 20.0);
    }

    #[test]
    fn unrendered_retarget_starts_from_old_target() {
        let (mut engine, scene, start) = setup();
        engine.apply_update(&scene, EntityId(1), pose(10.0, 0.0), start);
        engine.apply_update(&scene, EntityId(1), pose(20.0, 0.0), start);

        let entity = engine.get(EntityId(1)).unwrap();
        assert_eq!(entity.previous.position.x, 10.0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let (mut engine, mut scene, start) = setup();
        assert!(!engine.apply_update(&scene, EntityId(5), pose(1.0, 0.0), start));
        assert!(!engine.despawn(&mut scene, EntityId(5)));
        assert!(!engine.apply_update(&scene, EntityId(0), pose(1.0, 0.0), start));
    }

    #[test]
    fn despawn_and_clear_remove_objects() {
        let (mut engine, mut scene, start) = setup();
        engine.spawn(&mut scene, EntityId(2), pose(1.0, 0.0), start);

        assert!(engine.despawn(&mut scene, EntityId(1)));
        assert_eq!(engine.active_count(), 1);

        engine.clear(&mut scene);
        assert_eq!(engine.active_count(), 0);
        assert!(scene.is_empty());
    }
}
