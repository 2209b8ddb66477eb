//! Authoritative player state owned by the server.

mod changes;
mod slots;

use std::fmt;
use std::time::Duration;

use glam::Vec3;
use thiserror::Error;

use crate::angle::normalize_yaw;
use crate::entity::{EntityId, EntitySnapshot, Pose};
use crate::movement::{JUMP_HEIGHT, JumpFall, JumpFallFlags, MOVEMENT_SPEED};
use crate::protocol::ServerPacket;
use crate::time::{SEND_RATE_LIMIT, TICK_PERIOD};
use crate::transport::PeerId;

pub use changes::ChangedSet;
pub use slots::SlotTable;

pub const MAX_ENTITIES: usize = 1024;

pub const MAX_TRUSTED_RTT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: EntityId,
    pub peer: PeerId,
    pub position: Vec3,
    pub rotation: f32,
    pub jump: JumpFall,
}

impl PlayerRecord {
    fn new(id: EntityId, peer: PeerId) -> Self {
        Self {
            id,
            peer,
            position: Vec3::ZERO,
            rotation: 0.0,
            jump: JumpFall::default(),
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot::new(self.id, self.pose())
    }

    fn correction(&self, reason: RejectReason) -> Correction {
        Correction {
            position: self.position,
            jump_fall: self.jump.flags(),
            reason,
        }
    }
}

/// Bounds used to judge client movement reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationLimits {
    pub max_speed: f32,
    pub max_height: f32,
    pub rate_limit: Duration,
    pub tick_period: Duration,
    /// Round-trip times above this do not widen the tolerance further.
    pub max_rtt: Duration,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_speed: MOVEMENT_SPEED,
            max_height: JUMP_HEIGHT,
            rate_limit: SEND_RATE_LIMIT,
            tick_period: TICK_PERIOD,
            max_rtt: MAX_TRUSTED_RTT,
        }
    }
}

impl ValidationLimits {
    /// Largest displacement accepted from one position report of a peer
    /// with round-trip time `rtt`.
    pub fn distance_tolerance(&self, rtt: Duration) -> f32 {
        let window = rtt.min(self.max_rtt).as_secs_f64()
            + self.rate_limit.as_secs_f64()
            + self.tick_period.as_secs_f64();
        (window * self.max_speed as f64) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    HeightExceeded { height: f32 },
    TooFar { distance: f32, tolerance: f32 },
    AlreadyAirborne,
    NotFinite,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::HeightExceeded { height } => write!(f, "height {height:.2} out of range"),
            RejectReason::TooFar {
                distance,
                tolerance,
            } => write!(f, "moved {distance:.2} with tolerance {tolerance:.2}"),
            RejectReason::AlreadyAirborne => write!(f, "jump while airborne"),
            RejectReason::NotFinite => write!(f, "non-finite coordinates"),
        }
    }
}

/// Authoritative state sent back to a client whose report was refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub position: Vec3,
    pub jump_fall: JumpFallFlags,
    pub reason: RejectReason,
}

impl Correction {
    pub fn to_packet(&self) -> ServerPacket {
        ServerPacket::PositionCorrection {
            position: self.position,
            jump_fall: self.jump_fall,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validation {
    Accepted,
    Rejected(Correction),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("all {0} entity slots are in use")]
    Full(usize),
    #[error("entity {0} is not connected")]
    UnknownEntity(EntityId),
    #[error("entity {0} reported a non-finite value")]
    NotFinite(EntityId),
}

#[derive(Debug, Clone)]
pub struct World {
    slots: SlotTable<PlayerRecord>,
    changed: ChangedSet,
    limits: ValidationLimits,
    tick: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(MAX_ENTITIES, ValidationLimits::default())
    }
}

impl World {
    pub fn new(capacity: usize, limits: ValidationLimits) -> Self {
        Self {
            slots: SlotTable::with_capacity(capacity),
            changed: ChangedSet::default(),
            limits,
            tick: 0,
        }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn active_count(&self) -> usize {
        self.slots.len()
    }

    pub fn changed(&self) -> &ChangedSet {
        &self.changed
    }

    pub fn get(&self, id: EntityId) -> Option<&PlayerRecord> {
        self.slots.get(id.index())
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.slots.iter().map(|(_, record)| record)
    }

    /// Places a new player at the origin in the lowest free slot.
    pub fn connect(&mut self, peer: PeerId) -> Result<EntityId, WorldError> {
        self.slots
            .insert_with(|index| PlayerRecord::new(EntityId::from_index(index), peer))
            .map(EntityId::from_index)
            .ok_or(WorldError::Full(self.slots.capacity()))
    }

    pub fn disconnect(&mut self, id: EntityId) -> Result<PlayerRecord, WorldError> {
        let record = self
            .slots
            .remove(id.index())
            .ok_or(WorldError::UnknownEntity(id))?;
        self.changed.remove(id);
        Ok(record)
    }

    /// Poses of every active player other than `id`.
    pub fn snapshot_except(&self, id: EntityId) -> Vec<EntitySnapshot> {
        self.players()
            .filter(|record| record.id != id)
            .map(PlayerRecord::snapshot)
            .collect()
    }

    /// Checks a reported position against the last authoritative one and
    /// applies it when plausible. Height stays server-owned: only the jump
    /// state machine moves an entity off the ground, so the reported Z is
    /// checked but never stored.
    pub fn apply_position(
        &mut self,
        id: EntityId,
        position: Vec3,
        rtt: Duration,
    ) -> Result<Validation, WorldError> {
        let limits = self.limits;
        let record = self
            .slots
            .get_mut(id.index())
            .ok_or(WorldError::UnknownEntity(id))?;

        if !position.is_finite() {
            return Ok(Validation::Rejected(
                record.correction(RejectReason::NotFinite),
            ));
        }

        let height = record.position.z;
        if height > limits.max_height {
            // Settle on the ground, otherwise every later report fails too.
            record.position.z = 0.0;
            record.jump.land();
            self.changed.insert(id);
            return Ok(Validation::Rejected(
                record.correction(RejectReason::HeightExceeded { height }),
            ));
        }

        let distance = record.position.distance(position);
        let tolerance = limits.distance_tolerance(rtt);
        if !(distance <= tolerance) {
            return Ok(Validation::Rejected(record.correction(
                RejectReason::TooFar {
                    distance,
                    tolerance,
                },
            )));
        }

        record.position.x = position.x;
        record.position.y = position.y;
        self.changed.insert(id);
        Ok(Validation::Accepted)
    }

    pub fn apply_jump(&mut self, id: EntityId) -> Result<Validation, WorldError> {
        let record = self
            .slots
            .get_mut(id.index())
            .ok_or(WorldError::UnknownEntity(id))?;

        if !record.jump.try_jump() {
            return Ok(Validation::Rejected(
                record.correction(RejectReason::AlreadyAirborne),
            ));
        }
        self.changed.insert(id);
        Ok(Validation::Accepted)
    }

    /// Rotation is taken as-is and rides along with the next delta entry.
    pub fn apply_rotation(&mut self, id: EntityId, rotation: f32) -> Result<(), WorldError> {
        let record = self
            .slots
            .get_mut(id.index())
            .ok_or(WorldError::UnknownEntity(id))?;
        if !rotation.is_finite() {
            return Err(WorldError::NotFinite(id));
        }
        record.rotation = normalize_yaw(rotation);
        Ok(())
    }

    pub fn mark_changed(&mut self, id: EntityId) -> bool {
        self.slots.contains(id.index()) && self.changed.insert(id)
    }

    /// Advances every airborne player by `dt`.
    pub fn step(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        for (_, record) in self.slots.iter_mut() {
            if !record.jump.is_airborne() {
                continue;
            }
            let before = (record.position.z, record.jump.phase);
            record.position.z = record.jump.advance(dt);
            if (record.position.z, record.jump.phase) != before {
                self.changed.insert(record.id);
            }
        }
        self.tick += 1;
    }

    /// Entries for every entity changed since the last call, in ascending
    /// id order. The changed set is emptied whether or not anything is
    /// returned.
    pub fn take_changes(&mut self) -> Option<Vec<EntitySnapshot>> {
        let entries: Vec<_> = self
            .changed
            .iter()
            .filter_map(|id| self.slots.get(id.index()))
            .map(PlayerRecord::snapshot)
            .collect();
        self.changed.clear();

        (!entries.is_empty()).then_some(entries)
    }
}
