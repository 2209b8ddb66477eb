use glam::Vec2;

/// Device state sampled once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    /// Cursor travel in pixels since the previous frame.
    pub mouse_delta: Vec2,
}

impl InputState {
    /// +1 forward, -1 backward.
    pub fn forward_axis(&self) -> f32 {
        (self.forward as i8 - self.backward as i8) as f32
    }

    /// +1 left, -1 right.
    pub fn side_axis(&self) -> f32 {
        (self.left as i8 - self.right as i8) as f32
    }
}
