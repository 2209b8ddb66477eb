//! Deterministic input for headless clients.

use crate::player::InputState;

/// Frames per phase of the walk/turn cycle.
const PHASE_FRAMES: u64 = 90;
const JUMP_EVERY: u64 = 150;

/// Walks forward, turns left, walks again, turns right, jumping now and then.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    frame: u64,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn next_input(&mut self) -> InputState {
        let phase = (self.frame / PHASE_FRAMES) % 4;
        let input = InputState {
            forward: phase % 2 == 0,
            left: phase == 1,
            right: phase == 3,
            jump: self.frame % JUMP_EVERY == JUMP_EVERY - 1,
            ..Default::default()
        };
        self.frame += 1;
        input
    }
}
