use crate::math::*;

use super::Polyline;

/// Straight segments through the control points. Each segment moves at the
/// multiplier of the point it starts from.
pub fn bake(points: &[TVec2], multipliers: &[TReal], looped: bool) -> (Polyline, Vec<TReal>) {
    let mut line = Polyline::default();
    let mut per_segment = Vec::with_capacity(points.len());
    let closing = if looped && points.len() > 1 {
        points.first().copied()
    } else {
        None
    };
    let mut start_multiplier = 1.;
    for (ii, point) in points.iter().copied().chain(closing).enumerate() {
        let before = line.segment_count();
        line.push(point);
        if line.segment_count() > before {
            per_segment.push(start_multiplier);
        }
        start_multiplier = multipliers
            .get(ii % points.len().max(1))
            .copied()
            .unwrap_or(1.);
    }
    (line, per_segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_take_the_start_multiplier() {
        let points = [TVec2::new(0., 0.), TVec2::new(1., 0.), TVec2::new(1., 1.)];
        let (line, per_segment) = bake(&points, &[0.5, 2., 9.], false);
        assert_eq!(line.segment_count(), 2);
        assert_eq!(per_segment, vec![0.5, 2.]);
    }

    #[test]
    fn looped_paths_close_back_to_the_start() {
        let points = [TVec2::new(0., 0.), TVec2::new(1., 0.), TVec2::new(1., 1.)];
        let (line, per_segment) = bake(&points, &[1., 1., 3.], true);
        assert_eq!(line.segment_count(), 3);
        assert_eq!(per_segment.last(), Some(&3.));
        assert!((line.length() - (2. + 2f32.sqrt())).abs() < 1e-5);
    }

    #[test]
    fn duplicate_points_do_not_shift_multipliers() {
        let points = [
            TVec2::new(0., 0.),
            TVec2::new(0., 0.),
            TVec2::new(2., 0.),
        ];
        let (line, per_segment) = bake(&points, &[1., 4., 1.], false);
        assert_eq!(line.segment_count(), 1);
        assert_eq!(per_segment, vec![4.]);
    }
}
