//! Chained quadratic Bezier curves.
//!
//! Control points are read as `anchor, handle, anchor, handle, ...`. A chain
//! ending on a handle is padded with its last point so every segment has
//! both anchors.

use crate::math::*;

use super::Polyline;

#[inline]
pub fn quadratic(p0: TVec2, p1: TVec2, p2: TVec2, t: TReal) -> TVec2 {
    let u = 1. - t;
    p0 * (u * u) + p1 * (2. * u * t) + p2 * (t * t)
}

pub fn bake(points: &[TVec2], looped: bool, line_density: u32) -> Polyline {
    let mut control: Vec<TVec2> = points.to_vec();
    if looped && control.len() > 1 {
        if let Some(first) = control.first().copied() {
            control.push(first);
        }
    }
    if control.len() > 1 && control.len() % 2 == 0 {
        if let Some(last) = control.last().copied() {
            control.push(last);
        }
    }

    let mut line = Polyline::default();
    if let Some(first) = control.first() {
        line.push(*first);
    }
    let steps = line_density.max(1);
    for seg in control.windows(3).step_by(2) {
        // joint samples coincide with the previous segment's last and are
        // dropped by the polyline
        for step in 1..=steps {
            let t = step as TReal / steps as TReal;
            line.push(quadratic(seg[0], seg[1], seg[2], t));
        }
    }
    line
}

/// Control point multipliers spread evenly over the curve's length.
pub fn interpolated_multiplier(control: &[TReal], distance: TReal, length: TReal) -> TReal {
    match control.len() {
        0 => 1.,
        1 => control[0],
        len => {
            if length <= TReal::EPSILON {
                return control[0];
            }
            let t = (distance / length).clamp(0., 1.) * (len - 1) as TReal;
            let ii = (t.floor() as usize).min(len - 2);
            lerp(control[ii], control[ii + 1], t - ii as TReal)
        }
    }
}
