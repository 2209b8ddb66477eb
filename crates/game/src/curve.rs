/// One-dimensional cubic Bézier segment over normalized time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    pub p0: f32,
    pub c0: f32,
    pub c1: f32,
    pub p1: f32,
}

/// Rise from the ground to the apex.
pub const JUMP_CURVE: Curve = Curve::new(0.0, 0.5, 1.0, 1.0);

/// Descent from the apex back to the ground.
pub const FALL_CURVE: Curve = Curve::new(1.0, 1.0, 0.5, 0.0);

impl Curve {
    pub const fn new(p0: f32, c0: f32, c1: f32, p1: f32) -> Self {
        Self { p0, c0, c1, p1 }
    }

    /// Evaluates the curve at `s`, clamped into `[0, 1]`.
    pub fn sample(&self, s: f32) -> f32 {
        let s = s.clamp(0.0, 1.0);
        let u = 1.0 - s;

        u * u * u * self.p0
            + 3.0 * u * u * s * self.c0
            + 3.0 * u * s * s * self.c1
            + s * s * s * self.p1
    }
}
