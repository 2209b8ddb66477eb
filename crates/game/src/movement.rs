use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::curve::{FALL_CURVE, JUMP_CURVE};

/// Horizontal speed in world units per second.
pub const MOVEMENT_SPEED: f32 = 10.0;
/// Character spin speed in radians per second.
pub const SPIN_SPEED: f32 = 2.0;
pub const JUMP_HEIGHT: f32 = 5.0;
/// Seconds spent in each of the rising and falling phases.
pub const JUMP_DURATION: f32 = 0.5;

bitflags! {
    /// Jump/fall state as it travels in correction packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct JumpFallFlags: u8 {
        const JUMPING = 1 << 0;
        const FALLING = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JumpPhase {
    #[default]
    Grounded,
    Jumping,
    Falling,
}

impl JumpPhase {
    pub fn is_airborne(self) -> bool {
        !matches!(self, JumpPhase::Grounded)
    }

    pub fn flags(self) -> JumpFallFlags {
        match self {
            JumpPhase::Grounded => JumpFallFlags::empty(),
            JumpPhase::Jumping => JumpFallFlags::JUMPING,
            JumpPhase::Falling => JumpFallFlags::FALLING,
        }
    }

    /// A bitfield with both bits set is read as jumping.
    pub fn from_flags(flags: JumpFallFlags) -> Self {
        if flags.contains(JumpFallFlags::JUMPING) {
            JumpPhase::Jumping
        } else if flags.contains(JumpFallFlags::FALLING) {
            JumpPhase::Falling
        } else {
            JumpPhase::Grounded
        }
    }
}

/// Samples the jump/fall trajectory for the current `airtime` and returns the
/// height above ground. Phase transitions are written back into `phase` and
/// `airtime`.
pub fn sample_jump_fall(phase: &mut JumpPhase, airtime: &mut f32) -> f32 {
    let mut s = *airtime / JUMP_DURATION;

    if *phase == JumpPhase::Jumping && s > 1.0 {
        s -= 1.0;
        *airtime = s * JUMP_DURATION;
        *phase = JumpPhase::Falling;
    }

    match *phase {
        JumpPhase::Jumping => JUMP_HEIGHT * JUMP_CURVE.sample(s),
        JumpPhase::Falling if s <= 1.0 => JUMP_HEIGHT * FALL_CURVE.sample(s),
        _ => {
            *phase = JumpPhase::Grounded;
            *airtime = 0.0;
            0.0
        }
    }
}

/// Jump/fall state machine shared by the authoritative world and the local
/// prediction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JumpFall {
    pub phase: JumpPhase,
    pub airtime: f32,
}

impl JumpFall {
    pub fn is_airborne(&self) -> bool {
        self.phase.is_airborne()
    }

    pub fn flags(&self) -> JumpFallFlags {
        self.phase.flags()
    }

    /// Starts a jump. Returns false when already airborne.
    pub fn try_jump(&mut self) -> bool {
        if self.is_airborne() {
            return false;
        }
        self.phase = JumpPhase::Jumping;
        self.airtime = 0.0;
        true
    }

    /// Advances airborne state by `dt` seconds and returns the new height.
    pub fn advance(&mut self, dt: f32) -> f32 {
        if !self.is_airborne() {
            return 0.0;
        }
        self.airtime += dt;
        sample_jump_fall(&mut self.phase, &mut self.airtime)
    }

    pub fn land(&mut self) {
        self.phase = JumpPhase::Grounded;
        self.airtime = 0.0;
    }

    /// Rebuilds the airtime that puts an entity in `phase` at `height`.
    /// Both curves are monotonic, so a bisection over normalized time finds
    /// it.
    pub fn at_height(phase: JumpPhase, height: f32) -> Self {
        let curve = match phase {
            JumpPhase::Grounded => return Self::default(),
            JumpPhase::Jumping => JUMP_CURVE,
            JumpPhase::Falling => FALL_CURVE,
        };
        let target = (height / JUMP_HEIGHT).clamp(0.0, 1.0);
        let rising = curve.p1 > curve.p0;

        let (mut lo, mut hi) = (0.0f32, 1.0f32);
        for _ in 0..24 {
            let mid = (lo + hi) * 0.5;
            if (curve.sample(mid) < target) == rising {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Self {
            phase,
            airtime: (lo + hi) * 0.5 * JUMP_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounded_samples_zero_and_resets_airtime() {
        let mut phase = JumpPhase::Grounded;
        let mut airtime = 0.3;

        assert_eq!(sample_jump_fall(&mut phase, &mut airtime), 0.0);
        assert_eq!(phase, JumpPhase::Grounded);
        assert_eq!(airtime, 0.0);
    }

    #[test]
    fn jump_starts_at_ground_and_peaks_at_jump_height() {
        let mut phase = JumpPhase::Jumping;
        let mut airtime = 0.0;
        assert_eq!(sample_jump_fall(&mut phase, &mut airtime), 0.0);

        let mut airtime = JUMP_DURATION;
        let height = sample_jump_fall(&mut phase, &mut airtime);
        assert!((height - JUMP_HEIGHT).abs() < 1e-5);
        assert_eq!(phase, JumpPhase::Jumping);
    }

    #[test]
    fn jump_overflow_carries_into_fall() {
        let mut phase = JumpPhase::Jumping;
        let mut airtime = 0.75;

        let height = sample_jump_fall(&mut phase, &mut airtime);

        assert_eq!(phase, JumpPhase::Falling);
        assert!((airtime - 0.25).abs() < 1e-6);
        assert!((height - JUMP_HEIGHT * FALL_CURVE.sample(0.5)).abs() < 1e-5);
    }

    #[test]
    fn large_overflow_lands_immediately() {
        let mut phase = JumpPhase::Jumping;
        let mut airtime = 1.2;

        assert_eq!(sample_jump_fall(&mut phase, &mut airtime), 0.0);
        assert_eq!(phase, JumpPhase::Grounded);
        assert_eq!(airtime, 0.0);
    }

    #[test]
    fn full_arc_lands_after_one_second() {
        let mut state = JumpFall::default();
        assert!(state.try_jump());

        let mut phases = Vec::new();
        for _ in 0..11 {
            state.advance(0.1);
            phases.push(state.phase);
        }

        assert_eq!(phases[0], JumpPhase::Jumping);
        assert!(phases.contains(&JumpPhase::Falling));
        assert_eq!(state.phase, JumpPhase::Grounded);
        assert_eq!(state.airtime, 0.0);
    }

    #[test]
    fn try_jump_refuses_while_airborne() {
        let mut state = JumpFall::default();
        assert!(state.try_jump());
        assert!(!state.try_jump());

        state.phase = JumpPhase::Falling;
        assert!(!state.try_jump());
    }

    #[test]
    fn grounded_advance_leaves_airtime_alone() {
        let mut state = JumpFall::default();
        assert_eq!(state.advance(0.1), 0.0);
        assert_eq!(state.airtime, 0.0);
    }

    #[test]
    fn at_height_recovers_airtime() {
        let height = JUMP_HEIGHT * JUMP_CURVE.sample(0.3);
        let state = JumpFall::at_height(JumpPhase::Jumping, height);
        assert!((state.airtime - 0.15).abs() < 1e-3);

        let height = JUMP_HEIGHT * FALL_CURVE.sample(0.8);
        let state = JumpFall::at_height(JumpPhase::Falling, height);
        assert!((state.airtime - 0.4).abs() < 1e-3);

        assert_eq!(JumpFall::at_height(JumpPhase::Grounded, 3.0), JumpFall::default());
    }

    #[test]
    fn flags_round_trip_through_phase() {
        for phase in [JumpPhase::Grounded, JumpPhase::Jumping, JumpPhase::Falling] {
            assert_eq!(JumpPhase::from_flags(phase.flags()), phase);
        }
        assert_eq!(JumpPhase::from_flags(JumpFallFlags::all()), JumpPhase::Jumping);
    }
}
