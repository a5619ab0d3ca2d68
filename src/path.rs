//! Curves that actors follow by distance travelled.
//!
//! A [`PathTemplate`] is configuration; [`Path::bake`] instantiates it at a
//! placement into a world-space polyline. Followers only ever talk to the
//! [`PathResource`] trait so the pool can hand out any curve type.

use deps::*;

use educe::Educe;

use crate::{
    error::{FormationError, FormationResult},
    math::*,
    SmartString,
};

pub mod bezier;
pub mod follower;
pub mod linear;
pub mod pool;

pub use follower::{FollowStep, PathFollower};
pub use pool::{PathHandle, PathPool, Paths, PrewarmedPathPool};

/// Followers never crawl slower than this fraction of their base speed.
pub const MIN_SPEED_MULTIPLIER: TReal = 0.1;

pub trait PathResource: Send + Sync {
    fn total_length(&self) -> TReal;
    fn point_at_distance(&self, distance: TReal) -> TVec2;
    fn speed_multiplier_at_distance(&self, distance: TReal) -> TReal;
    fn is_looped(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Educe)]
#[serde(crate = "serde")]
#[educe(Default)]
pub enum PathKind {
    #[educe(Default)]
    Linear,
    /// Chained quadratic Bezier segments.
    Bezier,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct PathPoint {
    /// Relative to the placement the path is instantiated at.
    pub position: (TReal, TReal),
    pub speed_multiplier: TReal,
}

impl Default for PathPoint {
    fn default() -> Self {
        Self {
            position: (0., 0.),
            speed_multiplier: 1.,
        }
    }
}

impl PathPoint {
    pub fn new(x: TReal, y: TReal) -> Self {
        Self {
            position: (x, y),
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed_multiplier: TReal) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    #[inline]
    pub fn local(&self) -> TVec2 {
        TVec2::from(self.position)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct PathTemplate {
    pub name: SmartString,
    pub kind: PathKind,
    pub looped: bool,
    /// Samples per Bezier segment. Ignored by linear paths.
    pub line_density: u32,
    pub points: Vec<PathPoint>,
}

impl Default for PathTemplate {
    fn default() -> Self {
        Self {
            name: SmartString::new(),
            kind: PathKind::Linear,
            looped: false,
            line_density: 10,
            points: Vec::new(),
        }
    }
}

impl PathTemplate {
    pub fn linear(name: &str, points: Vec<PathPoint>) -> Self {
        Self {
            name: name.into(),
            points,
            ..Default::default()
        }
    }

    pub fn bezier(name: &str, points: Vec<PathPoint>) -> Self {
        Self {
            name: name.into(),
            kind: PathKind::Bezier,
            points,
            ..Default::default()
        }
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn validate(&self) -> FormationResult<()> {
        if self.points.is_empty() {
            return Err(FormationError::EmptyPath(self.name.clone()));
        }
        for point in &self.points {
            if !(point.speed_multiplier.is_finite() && point.speed_multiplier >= 0.) {
                return Err(FormationError::InvalidValue {
                    name: "speed_multiplier",
                    value: point.speed_multiplier,
                    expected: "[0, inf)",
                });
            }
        }
        if self.kind == PathKind::Bezier && self.line_density == 0 {
            return Err(FormationError::InvalidValue {
                name: "line_density",
                value: 0.,
                expected: "[1, inf)",
            });
        }
        Ok(())
    }
}

/// World-space sample points with the distance travelled up to each one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polyline {
    points: Vec<TVec2>,
    cumulative: Vec<TReal>,
}

impl Polyline {
    /// Consecutive duplicate points are dropped so every segment has length.
    pub fn new(points: impl IntoIterator<Item = TVec2>) -> Self {
        let mut out = Self::default();
        for point in points {
            out.push(point);
        }
        out
    }

    pub fn push(&mut self, point: TVec2) {
        match self.points.last() {
            None => {
                self.points.push(point);
                self.cumulative.push(0.);
            }
            Some(last) => {
                let seg = last.distance(point);
                if seg <= TReal::EPSILON {
                    return;
                }
                let total = self.length();
                self.points.push(point);
                self.cumulative.push(total + seg);
            }
        }
    }

    #[inline]
    pub fn length(&self) -> TReal {
        self.cumulative.last().copied().unwrap_or(0.)
    }

    #[inline]
    pub fn points(&self) -> &[TVec2] {
        &self.points
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Index of the segment containing `distance`, clamped to the ends.
    pub fn segment_at(&self, distance: TReal) -> usize {
        let segments = self.segment_count();
        if segments == 0 {
            return 0;
        }
        // first cumulative entry strictly past the distance ends the segment
        let end = self.cumulative.partition_point(|d| *d <= distance);
        end.saturating_sub(1).min(segments - 1)
    }

    pub fn point_at(&self, distance: TReal) -> TVec2 {
        match self.points.len() {
            0 => TVec2::ZERO,
            1 => self.points[0],
            _ => {
                let distance = distance.clamp(0., self.length());
                let ii = self.segment_at(distance);
                let seg_start = self.cumulative[ii];
                let seg_len = self.cumulative[ii + 1] - seg_start;
                let t = ((distance - seg_start) / seg_len).clamp(0., 1.);
                self.points[ii].lerp(self.points[ii + 1], t)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SpeedProfile {
    /// One multiplier per polyline segment.
    PerSegment(Vec<TReal>),
    /// Control point multipliers interpolated over normalised distance.
    Interpolated(Vec<TReal>),
}

/// A template instantiated at a placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    name: SmartString,
    kind: PathKind,
    looped: bool,
    line: Polyline,
    speed: SpeedProfile,
}

impl Path {
    pub fn bake(template: &PathTemplate, placement: &Placement) -> FormationResult<Self> {
        template.validate()?;
        let world: Vec<TVec2> = template
            .points
            .iter()
            .map(|p| placement.transform_point(p.local()))
            .collect();
        let multipliers: Vec<TReal> = template
            .points
            .iter()
            .map(|p| p.speed_multiplier)
            .collect();
        let (line, speed) = match template.kind {
            PathKind::Linear => {
                let (line, per_segment) = linear::bake(&world, &multipliers, template.looped);
                (line, SpeedProfile::PerSegment(per_segment))
            }
            PathKind::Bezier => (
                bezier::bake(&world, template.looped, template.line_density),
                SpeedProfile::Interpolated(multipliers),
            ),
        };
        Ok(Self {
            name: template.name.clone(),
            kind: template.kind,
            looped: template.looped,
            line,
            speed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn polyline(&self) -> &Polyline {
        &self.line
    }
}

impl PathResource for Path {
    fn total_length(&self) -> TReal {
        self.line.length()
    }

    fn point_at_distance(&self, distance: TReal) -> TVec2 {
        self.line.point_at(distance)
    }

    fn speed_multiplier_at_distance(&self, distance: TReal) -> TReal {
        match &self.speed {
            SpeedProfile::PerSegment(per_segment) => per_segment
                .get(self.line.segment_at(distance))
                .or_else(|| per_segment.last())
                .copied()
                .unwrap_or(1.),
            SpeedProfile::Interpolated(control) => {
                bezier::interpolated_multiplier(control, distance, self.line.length())
            }
        }
    }

    fn is_looped(&self) -> bool {
        self.looped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyline_drops_duplicate_points() {
        let line = Polyline::new([
            TVec2::new(0., 0.),
            TVec2::new(0., 0.),
            TVec2::new(1., 0.),
            TVec2::new(1., 0.),
            TVec2::new(1., 2.),
        ]);
        assert_eq!(line.points().len(), 3);
        assert!((line.length() - 3.).abs() < 1e-5);
    }

    #[test]
    fn polyline_point_at_is_clamped() {
        let line = Polyline::new([TVec2::new(0., 0.), TVec2::new(2., 0.)]);
        assert_eq!(line.point_at(-1.), TVec2::new(0., 0.));
        assert_eq!(line.point_at(1.), TVec2::new(1., 0.));
        assert_eq!(line.point_at(5.), TVec2::new(2., 0.));
    }

    #[test]
    fn single_point_template_bakes_to_zero_length() {
        let template = PathTemplate::linear("stay", vec![PathPoint::new(3., 4.)]);
        let path = Path::bake(&template, &Placement::from_translation(TVec2::new(1., 1.))).unwrap();
        assert_eq!(path.total_length(), 0.);
        assert_eq!(path.point_at_distance(10.), TVec2::new(4., 5.));
    }

    #[test]
    fn empty_template_is_rejected() {
        let template = PathTemplate::bezier("nothing", vec![]);
        assert_eq!(
            Path::bake(&template, &Placement::default()),
            Err(FormationError::EmptyPath("nothing".into()))
        );
    }
}
