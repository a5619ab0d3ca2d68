use crate::math::*;

use super::{PathResource, MIN_SPEED_MULTIPLIER};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowStep {
    pub position: TVec2,
    pub completed: bool,
}

/// Progress of one actor along one path.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathFollower {
    pub base_speed: TReal,
    pub distance: TReal,
}

impl PathFollower {
    pub fn new(base_speed: TReal) -> Self {
        Self {
            base_speed,
            distance: 0.,
        }
    }

    pub fn reset(&mut self) {
        self.distance = 0.;
    }

    pub fn advance(&mut self, path: &dyn PathResource, dt: TReal) -> FollowStep {
        let length = path.total_length();
        if length <= TReal::EPSILON {
            // nothing to travel, looped or not
            return FollowStep {
                position: path.point_at_distance(0.),
                completed: true,
            };
        }
        let multiplier = path
            .speed_multiplier_at_distance(self.distance)
            .max(MIN_SPEED_MULTIPLIER);
        self.distance += self.base_speed * multiplier * dt;
        let mut completed = false;
        if path.is_looped() {
            self.distance = self.distance.rem_euclid(length);
        } else if self.distance >= length {
            self.distance = length;
            completed = true;
        }
        FollowStep {
            position: path.point_at_distance(self.distance),
            completed,
        }
    }
}
