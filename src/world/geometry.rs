//! Spatial queries shared by the controllers: segment distance, road
//! membership, and the small angle helpers used for yaw-only bodies.

use bevy::prelude::*;
use rand::Rng;

/// A straight road piece between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoadSegment {
    pub start: Vec3,
    pub end: Vec3,
    /// Paved width in world units.
    pub width: f32,
}

impl RoadSegment {
    pub fn new(start: Vec3, end: Vec3, width: f32) -> Self {
        Self { start, end, width }
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }

    /// Point at parameter `t` (0 = start, 1 = end).
    pub fn lerp(&self, t: f32) -> Vec3 {
        self.start.lerp(self.end, t)
    }
}

/// Euclidean distance between two points. Used for vehicle proximity.
#[inline]
pub fn distance(a: Vec3, b: Vec3) -> f32 {
    a.distance(b)
}

/// Shortest distance from `point` to the segment `start..end`.
///
/// The projection onto the segment's line is clamped to `[0, length]`, so the
/// nearest point is always on the segment. A zero-length segment degrades to
/// the distance to `start`.
pub fn distance_to_segment(point: Vec3, start: Vec3, end: Vec3) -> f32 {
    let line = end - start;
    let length = line.length();
    if length <= f32::EPSILON {
        return point.distance(start);
    }

    let direction = line / length;
    let projection = (point - start).dot(direction).clamp(0.0, length);
    let nearest = start + direction * projection;

    point.distance(nearest)
}

/// True if `position` is within `margin` of any road segment.
///
/// Height is ignored: both the position and the segments are flattened onto
/// the ground plane before measuring.
pub fn is_on_road(position: Vec3, segments: &[RoadSegment], margin: f32) -> bool {
    let point = flatten(position);
    segments.iter().any(|segment| {
        distance_to_segment(point, flatten(segment.start), flatten(segment.end)) <= margin
    })
}

/// Pick a uniformly random segment, then a uniformly random point along it.
///
/// Returns `None` when there are no segments to pick from.
pub fn random_point_on_road<R: Rng + ?Sized>(
    segments: &[RoadSegment],
    rng: &mut R,
) -> Option<Vec3> {
    if segments.is_empty() {
        return None;
    }

    let segment = &segments[rng.gen_range(0..segments.len())];
    let t: f32 = rng.gen_range(0.0..=1.0);
    let point = segment.lerp(t);

    Some(Vec3::new(point.x, 0.0, point.z))
}

/// Angle in radians between two directions.
///
/// The dot product is clamped to `[-1, 1]` before `acos`, so slightly
/// denormalised inputs never produce NaN. Zero-length inputs yield 0.
pub fn angle_between(a: Vec3, b: Vec3) -> f32 {
    let (Some(a), Some(b)) = (a.try_normalize(), b.try_normalize()) else {
        return 0.0;
    };
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Local forward axis (+Z) rotated about +Y by `yaw`.
#[inline]
pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Rotate a local-space offset about +Y by `yaw`.
#[inline]
pub fn rotate_by_yaw(offset: Vec3, yaw: f32) -> Vec3 {
    Quat::from_rotation_y(yaw) * offset
}

/// Yaw component of a rotation (rotation about +Y).
#[inline]
pub fn yaw_from_rotation(rotation: Quat) -> f32 {
    let (yaw, _, _) = rotation.to_euler(EulerRot::YXZ);
    yaw
}

/// Project onto the ground plane (y = 0).
#[inline]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn crossroads() -> Vec<RoadSegment> {
        vec![
            RoadSegment::new(Vec3::new(-50.0, 0.0, 0.0), Vec3::new(50.0, 0.0, 0.0), 12.0),
            RoadSegment::new(Vec3::new(0.0, 0.0, -50.0), Vec3::new(0.0, 0.0, 50.0), 12.0),
        ]
    }

    #[test]
    fn degenerate_segment_is_point_distance() {
        let a = Vec3::new(3.0, -1.0, 7.5);
        for p in [Vec3::ZERO, Vec3::new(10.0, 4.0, -2.0), a] {
            assert!((distance_to_segment(p, a, a) - distance(p, a)).abs() < 1e-5);
        }
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let start = Vec3::ZERO;
        let end = Vec3::new(10.0, 0.0, 0.0);

        // Beyond the end.
        assert!((distance_to_segment(Vec3::new(13.0, 0.0, 4.0), start, end) - 5.0).abs() < 1e-5);
        // Before the start.
        assert!((distance_to_segment(Vec3::new(-3.0, 0.0, 0.0), start, end) - 3.0).abs() < 1e-5);
        // Perpendicular to the middle.
        assert!((distance_to_segment(Vec3::new(4.0, 0.0, 2.0), start, end) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn road_membership_uses_margin_and_ignores_height() {
        let roads = crossroads();
        assert!(is_on_road(Vec3::new(20.0, 3.0, 3.9), &roads, 4.0));
        assert!(!is_on_road(Vec3::new(10.0, 0.0, 10.0), &roads, 4.0));
        assert!(!is_on_road(Vec3::new(10.0, 0.0, 10.0), &[], 4.0));
    }

    #[test]
    fn random_points_land_on_the_road() {
        let roads = crossroads();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let point = random_point_on_road(&roads, &mut rng).unwrap();
            assert!(is_on_road(point, &roads, 1e-3));
        }
        assert!(random_point_on_road(&[], &mut rng).is_none());
    }

    #[test]
    fn angle_between_never_nans() {
        let a = Vec3::new(0.0, 0.0, 1.0);
        let b = Vec3::new(0.0, 0.0, 1.000_000_1);
        let nearly_parallel = angle_between(a, b);
        assert!(!nearly_parallel.is_nan());
        assert!(nearly_parallel < 1e-3);
        assert!((angle_between(a, -a) - std::f32::consts::PI).abs() < 1e-5);
        assert_eq!(angle_between(a, Vec3::ZERO), 0.0);
    }

    #[test]
    fn yaw_round_trips_through_rotation() {
        let yaw = 1.2;
        let forward = forward_from_yaw(yaw);
        let rotated = rotate_by_yaw(Vec3::Z, yaw);
        assert!(forward.distance(rotated) < 1e-5);
        assert!((yaw_from_rotation(Quat::from_rotation_y(yaw)) - yaw).abs() < 1e-5);
    }
}
