use deps::*;

use bevy::math::{Mat2, Vec2};

pub mod real {
    pub use std::f32::*;
}

pub type TReal = f32;
pub type TVec2 = Vec2;

/// Step from `current` towards `target` by at most `max_delta`, landing
/// exactly on the target when it's within reach.
#[inline]
pub fn move_towards(current: TVec2, target: TVec2, max_delta: TReal) -> TVec2 {
    let to_target = target - current;
    let dist = to_target.length();
    if dist <= max_delta || dist <= TReal::EPSILON {
        target
    } else {
        current + (to_target / dist) * max_delta
    }
}

#[inline]
pub fn lerp(a: TReal, b: TReal, t: TReal) -> TReal {
    a + (b - a) * t
}

/// Position and orientation of something in the play field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub translation: TVec2,
    /// Counter-clockwise, in radians.
    pub rotation: TReal,
}

impl Placement {
    pub fn new(translation: TVec2, rotation: TReal) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: TVec2) -> Self {
        Self {
            translation,
            rotation: 0.,
        }
    }

    #[inline]
    pub fn transform_point(&self, local: TVec2) -> TVec2 {
        if self.rotation == 0. {
            self.translation + local
        } else {
            self.translation + Mat2::from_angle(self.rotation) * local
        }
    }
}

#[test]
fn move_towards_clamps_at_target() {
    let start = TVec2::new(0., 0.);
    let target = TVec2::new(3., 4.);
    let step = move_towards(start, target, 1.);
    assert!((step.length() - 1.).abs() < 1e-5);
    assert!((step - TVec2::new(0.6, 0.8)).length() < 1e-5);
    assert_eq!(move_towards(start, target, 10.), target);
    assert_eq!(move_towards(target, target, 0.), target);
}

#[test]
fn placement_rotates_then_translates() {
    let placement = Placement::new(TVec2::new(10., 0.), real::consts::FRAC_PI_2);
    let out = placement.transform_point(TVec2::new(1., 0.));
    assert!((out - TVec2::new(10., 1.)).length() < 1e-5);
    let flat = Placement::from_translation(TVec2::new(-2., 3.));
    assert_eq!(flat.transform_point(TVec2::new(1., 1.)), TVec2::new(-1., 4.));
}
