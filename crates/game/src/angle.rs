use std::f32::consts::{PI, TAU};

/// Wraps a yaw angle into `[0, 2π)`.
pub fn normalize_yaw(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Signed shortest rotation from `from` to `to`, in `(-π, π]`.
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(TAU);
    if delta > PI { delta - TAU } else { delta }
}

/// Interpolates along the shortest arc and normalizes the result.
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    normalize_yaw(from + shortest_angle_delta(from, to) * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_angles(a: f32, b: f32) -> bool {
        shortest_angle_delta(a, b).abs() < 1e-4
    }

    #[test]
    fn lerp_wraps_through_zero_in_both_directions() {
        let a = 350f32.to_radians();
        let b = 10f32.to_radians();

        assert!(close_angles(lerp_angle(a, b, 0.5), 0.0));
        assert!(close_angles(lerp_angle(b, a, 0.5), 0.0));
    }

    #[test]
    fn lerp_endpoints() {
        let a = 1.0;
        let b = 2.5;
        assert!(close_angles(lerp_angle(a, b, 0.0), a));
        assert!(close_angles(lerp_angle(a, b, 1.0), b));
    }

    #[test]
    fn normalize_stays_in_range() {
        for angle in [-7.0, -PI, -0.0, 0.0, PI, TAU, 13.0] {
            let wrapped = normalize_yaw(angle);
            assert!((0.0..TAU).contains(&wrapped), "{angle} -> {wrapped}");
        }
    }

    #[test]
    fn delta_prefers_short_arc() {
        assert!((shortest_angle_delta(0.1, TAU - 0.1) + 0.2).abs() < 1e-5);
        assert!((shortest_angle_delta(TAU - 0.1, 0.1) - 0.2).abs() < 1e-5);
    }
}
