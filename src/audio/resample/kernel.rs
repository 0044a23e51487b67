use crate::audio::constants::{INT16_MAX_F, INT16_MIN_F};

#[inline]
pub fn linear(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Catmull-Rom interpolation between `p[1]` and `p[2]` at `t ∈ [0, 1)`.
#[inline]
pub fn hermite(p: [f32; 4], t: f32) -> f32 {
    let c0 = p[1];
    let c1 = 0.5 * (p[2] - p[0]);
    let c2 = p[0] - 2.5 * p[1] + 2.0 * p[2] - 0.5 * p[3];
    let c3 = 0.5 * (p[3] - p[0]) + 1.5 * (p[1] - p[2]);
    ((c3 * t + c2) * t + c1) * t + c0
}

#[inline]
pub fn to_i16(s: f32) -> i16 {
    s.round().clamp(INT16_MIN_F, INT16_MAX_F) as i16
}
