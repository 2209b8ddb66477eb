use glam::{Vec2, Vec3};
use hopper::{
    JumpFall, JumpFallFlags, JumpPhase, MOVEMENT_SPEED, Pose, SPIN_SPEED, normalize_yaw,
};

use super::input::InputState;
use super::mode::{ButtonAction, ControlMode, MouseButton};

/// Radians of turn per pixel of horizontal mouse travel.
pub const MOUSE_SENSITIVITY: f32 = 0.005;

/// Local state changes the network layer may want to report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    Moved { position: Vec3 },
    Rotated { rotation: f32 },
    Jumped,
}

/// Client-side prediction of the local character.
#[derive(Debug, Clone, Default)]
pub struct LocalPlayer {
    position: Vec3,
    rotation: f32,
    /// Camera yaw relative to the character.
    camera_yaw: f32,
    movement_direction: Vec2,
    rotation_delta: f32,
    jump_requested: bool,
    jump: JumpFall,
    mode: ControlMode,
}

impl LocalPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    pub fn camera_yaw(&self) -> f32 {
        self.camera_yaw
    }

    pub fn jump_state(&self) -> JumpFall {
        self.jump
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn handle_button(&mut self, button: MouseButton, action: ButtonAction) -> ControlMode {
        let next = self.mode.transition(button, action);
        if self.mode == ControlMode::Look && next == ControlMode::OneHand {
            // Turn the character to where the camera looks.
            self.rotation_delta += self.camera_yaw;
            self.camera_yaw = 0.0;
        }
        if next != self.mode {
            log::debug!("Control mode {:?} -> {:?}", self.mode, next);
        }
        self.mode = next;
        next
    }

    /// Accumulates one frame of input. Nothing moves until [`update`].
    ///
    /// [`update`]: LocalPlayer::update
    pub fn apply_input(&mut self, input: &InputState, dt: f32) {
        let mut direction = Vec2::new(input.forward_axis(), 0.0);
        if self.mode.runs_forward() && input.forward_axis() <= 0.0 {
            direction.x += 1.0;
        }

        let side = input.side_axis();
        if self.mode.strafes() {
            direction.y += side;
        } else if side != 0.0 {
            let spin = side * SPIN_SPEED * dt;
            self.rotation_delta += spin;
            if self.mode.mouse_orbits_camera() {
                self.camera_yaw -= spin;
            }
        }
        self.movement_direction += direction;

        let turn = -input.mouse_delta.x * MOUSE_SENSITIVITY;
        if self.mode.mouse_turns_character() {
            self.rotation_delta += turn;
        } else if self.mode.mouse_orbits_camera() {
            self.camera_yaw += turn;
        }

        if input.jump {
            self.jump_requested = true;
        }
    }

    /// Consumes the accumulated input, advances the jump arc and reports
    /// what changed.
    pub fn update(&mut self, dt: f32) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        let mut moved = false;

        if self.rotation_delta != 0.0 {
            self.rotation = normalize_yaw(self.rotation + self.rotation_delta);
            events.push(PlayerEvent::Rotated {
                rotation: self.rotation,
            });
        }

        let local = self.movement_direction.normalize_or_zero();
        if local != Vec2::ZERO {
            let step = Vec2::from_angle(self.rotation).rotate(local) * MOVEMENT_SPEED * dt;
            self.position.x += step.x;
            self.position.y += step.y;
            moved = true;
        }

        if self.jump_requested && self.jump.try_jump() {
            events.push(PlayerEvent::Jumped);
        }

        if self.jump.is_airborne() {
            self.position.z = self.jump.advance(dt);
            moved = true;
        }

        if moved {
            events.push(PlayerEvent::Moved {
                position: self.position,
            });
        }

        self.movement_direction = Vec2::ZERO;
        self.rotation_delta = 0.0;
        self.jump_requested = false;
        events
    }

    /// Server corrections replace the prediction outright.
    pub fn apply_correction(&mut self, position: Vec3, jump_fall: JumpFallFlags) {
        self.position = position;

        let server_phase = JumpPhase::from_flags(jump_fall);
        match (self.jump.is_airborne(), server_phase.is_airborne()) {
            (true, false) => {
                self.jump.land();
                self.position.z = 0.0;
            }
            (false, true) => {
                self.jump = JumpFall::at_height(server_phase, position.z);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const DT: f32 = 1.0 / 60.0;

    fn forward() -> InputState {
        InputState {
            forward: true,
            ..Default::default()
        }
    }

    #[test]
    fn forward_moves_along_facing() {
        let mut player = LocalPlayer::new();
        player.apply_input(&forward(), DT);
        let events = player.update(DT);

        assert!((player.position().x - MOVEMENT_SPEED * DT).abs() < 1e-5);
        assert_eq!(player.position().y, 0.0);
        assert_eq!(
            events,
            vec![PlayerEvent::Moved {
                position: player.position()
            }]
        );
    }

    #[test]
    fn accumulators_reset_each_frame() {
        let mut player = LocalPlayer::new();
        player.apply_input(&forward(), DT);
        player.update(DT);

        assert!(player.update(DT).is_empty());
    }

    #[test]
    fn side_keys_spin_in_cursor_mode() {
        let mut player = LocalPlayer::new();
        let input = InputState {
            left: true,
            ..Default::default()
        };
        player.apply_input(&input, 0.5);
        let events = player.update(0.5);

        assert_eq!(player.position(), Vec3::ZERO);
        assert!((player.rotation() - SPIN_SPEED * 0.5).abs() < 1e-5);
        assert!(matches!(events[0], PlayerEvent::Rotated { .. }));
    }

    #[test]
    fn side_keys_strafe_in_control_mode() {
        let mut player = LocalPlayer::new();
        player.handle_button(MouseButton::Right, ButtonAction::Press);
        let input = InputState {
            left: true,
            ..Default::default()
        };
        player.apply_input(&input, DT);
        player.update(DT);

        assert_eq!(player.rotation(), 0.0);
        assert!(player.position().y > 0.0);
    }

    #[test]
    fn one_hand_runs_forward_without_keys() {
        let mut player = LocalPlayer::new();
        player.handle_button(MouseButton::Right, ButtonAction::Press);
        player.handle_button(MouseButton::Left, ButtonAction::Press);
        assert_eq!(player.mode(), ControlMode::OneHand);

        player.apply_input(&InputState::default(), DT);
        player.update(DT);
        assert!(player.position().x > 0.0);
    }

    #[test]
    fn look_then_right_faces_camera() {
        let mut player = LocalPlayer::new();
        player.handle_button(MouseButton::Left, ButtonAction::Press);
        let orbit = InputState {
            mouse_delta: Vec2::new(-FRAC_PI_2 / MOUSE_SENSITIVITY, 0.0),
            ..Default::default()
        };
        player.apply_input(&orbit, DT);
        player.update(DT);
        assert_eq!(player.rotation(), 0.0);

        player.handle_button(MouseButton::Right, ButtonAction::Press);
        player.update(DT);

        assert!((player.rotation() - FRAC_PI_2).abs() < 1e-4);
        assert_eq!(player.camera_yaw(), 0.0);
    }

    #[test]
    fn jump_emits_once_and_rises() {
        let mut player = LocalPlayer::new();
        let jump = InputState {
            jump: true,
            ..Default::default()
        };
        player.apply_input(&jump, DT);
        let events = player.update(DT);
        assert!(events.contains(&PlayerEvent::Jumped));
        assert!(player.position().z > 0.0);

        player.apply_input(&jump, DT);
        let events = player.update(DT);
        assert!(!events.contains(&PlayerEvent::Jumped));
    }

    #[test]
    fn grounded_correction_cancels_jump() {
        let mut player = LocalPlayer::new();
        player.apply_input(
            &InputState {
                jump: true,
                ..Default::default()
            },
            DT,
        );
        player.update(DT);
        assert!(player.jump_state().is_airborne());

        player.apply_correction(Vec3::new(1.0, 1.0, 2.0), JumpFallFlags::empty());

        assert_eq!(player.position(), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(player.jump_state().phase, JumpPhase::Grounded);
    }

    #[test]
    fn airborne_correction_is_adopted() {
        let mut player = LocalPlayer::new();
        player.apply_correction(Vec3::new(0.0, 0.0, 2.0), JumpFallFlags::FALLING);

        assert_eq!(player.jump_state().phase, JumpPhase::Falling);
        assert!(player.jump_state().airtime > 0.0);
        assert_eq!(player.position().z, 2.0);
    }
}
