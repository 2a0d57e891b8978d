//! # Hysteresis map construction and switchback detection
//!
//! After a successful plan, a 3-D field of proximity-to-path costs is
//! rebuilt so the next search is biased towards the previous solution.
//! Cells on the path read 0, cells beyond the saturation distance read 100.
//! The yaw axis only receives the bias in the buckets the path actually
//! passes through.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;

use nalgebra::{Point2, Vector2};

use msgs_if::pose::Pose2;
use util::maths::wrap_pi;

use crate::grid::{GridVec, GridVecF, Gridmap};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Subsample a discrete grid path at half-cell steps, interpolating yaw
/// along the shortest angle.
pub fn interpolate_path(path: &[GridVec], angles: i32) -> Vec<GridVecF> {
    let mut out = Vec::new();
    if path.is_empty() {
        return out;
    }

    for pair in path.windows(2) {
        let a = pair[0];
        let b = pair[1];
        let d = (b - a).cycle_signed(angles);
        let steps = (d.len() / 0.5).ceil().max(1.0) as i32;

        for i in 0..steps {
            let t = i as f32 / steps as f32;
            out.push(GridVecF::new(
                a.x as f32 + d.x as f32 * t,
                a.y as f32 + d.y as f32 * t,
                a.yaw as f32 + d.yaw as f32 * t,
            ));
        }
    }
    let last = *path.last().unwrap();
    out.push(last.as_f());
    out
}

/// Rebuild the hysteresis field around an interpolated path.
///
/// `max_dist` and `expand` are in grid units. Every cell within
/// `range + max_dist + expand + 5` of a path point, in a yaw bucket the
/// neighbouring path segment passes through, gets
/// `clamp((d_min - expand) / max_dist, 0, 1) * 100` where `d_min` is its
/// distance to the path polyline.
pub fn build(
    cm_hyst: &mut Gridmap<u8>,
    path_interpolated: &[GridVecF],
    range: i32,
    max_dist: f32,
    expand: f32,
    angles: i32,
) {
    cm_hyst.clear(100);

    let path_range = range + (max_dist + expand).ceil() as i32 + 5;

    // Candidate cells within the band around any path point
    let mut path_points: HashSet<GridVec> = HashSet::new();
    for p in path_interpolated {
        let base = p.round();
        for dx in -path_range..=path_range {
            for dy in -path_range..=path_range {
                let point =
                    GridVec::new(base.x + dx, base.y + dy, base.yaw).cycle_unsigned(angles);
                if !cm_hyst.in_bounds(point) {
                    continue;
                }
                path_points.insert(point);
            }
        }
    }

    for point in path_points {
        let mut d_min = f32::INFINITY;

        for pair in path_interpolated.windows(2) {
            let prev = pair[0];
            let cur = pair[1];

            let yaw = (cur.yaw.round() as i32).rem_euclid(angles);
            let yaw_prev = (prev.yaw.round() as i32).rem_euclid(angles);
            if yaw != point.yaw && yaw_prev != point.yaw {
                continue;
            }

            let d = dist_linestrip_2d(point, prev, cur);
            if d < d_min {
                d_min = d;
            }
        }

        if !d_min.is_finite() {
            continue;
        }
        let d_min = d_min.clamp(expand, expand + max_dist);
        cm_hyst[point] = (((d_min - expand) * 100.0 / max_dist).round() as i32).min(100) as u8;
    }
}

/// True if the metric path reverses its along-track direction of motion.
pub fn switchback_detect(path: &[Pose2]) -> bool {
    let mut dir_prev: Option<bool> = None;
    for pair in path.windows(2) {
        let prev = pair[0];
        let cur = pair[1];

        let len = ((cur.x - prev.x).powi(2) + (cur.y - prev.y).powi(2)).sqrt();
        if len <= 0.001 {
            continue;
        }

        let vel_yaw = (cur.y - prev.y).atan2(cur.x - prev.x);
        let dir = wrap_pi(cur.yaw - vel_yaw).abs() > std::f64::consts::FRAC_PI_2;

        if let Some(prev_dir) = dir_prev {
            if prev_dir != dir {
                return true;
            }
        }
        dir_prev = Some(dir);
    }
    false
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Planar distance from `p` to the segment (a, b).
fn dist_linestrip_2d(p: GridVec, a: GridVecF, b: GridVecF) -> f32 {
    let p = Point2::new(p.x as f32, p.y as f32);
    let a = Point2::new(a.x, a.y);
    let b = Point2::new(b.x, b.y);

    let ab: Vector2<f32> = b - a;
    let ap: Vector2<f32> = p - a;

    let sqlen = ab.norm_squared();
    if sqlen <= f32::EPSILON {
        return ap.norm();
    }
    let t = (ap.dot(&ab) / sqlen).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interpolate_endpoints() {
        let path = vec![GridVec::new(0, 0, 0), GridVec::new(4, 0, 0)];
        let interp = interpolate_path(&path, 16);

        assert_eq!(interp.first().unwrap().x, 0.0);
        assert_eq!(interp.last().unwrap().x, 4.0);
        // Half-cell sampling
        assert!(interp.len() >= 8);
    }

    #[test]
    fn test_interpolate_yaw_shortest() {
        let path = vec![GridVec::new(0, 0, 15), GridVec::new(3, 1, 1)];
        let interp = interpolate_path(&path, 16);

        // Yaw climbs through the seam (15 -> 17 == 1), never the long way
        for p in &interp {
            assert!(p.yaw >= 14.9 || p.yaw <= 1.05);
        }
    }

    #[test]
    fn test_build_zero_on_path() {
        let mut cm_hyst = Gridmap::new(GridVec::new(20, 10, 8), 100u8).unwrap();
        let path = vec![GridVec::new(2, 5, 0), GridVec::new(16, 5, 0)];
        let interp = interpolate_path(&path, 8);

        build(&mut cm_hyst, &interp, 4, 1.0, 0.0, 8);

        // Cells on the path at the path's yaw
        assert_eq!(cm_hyst[GridVec::new(8, 5, 0)], 0);
        assert_eq!(cm_hyst[GridVec::new(14, 5, 0)], 0);
        // A cell beyond the saturation distance keeps full cost
        assert_eq!(cm_hyst[GridVec::new(8, 9, 0)], 100);
        // Other yaw buckets are not biased
        assert_eq!(cm_hyst[GridVec::new(8, 5, 3)], 100);
    }

    #[test]
    fn test_build_gradient() {
        let mut cm_hyst = Gridmap::new(GridVec::new(20, 12, 4), 100u8).unwrap();
        let path = vec![GridVec::new(2, 6, 0), GridVec::new(17, 6, 0)];
        let interp = interpolate_path(&path, 4);

        build(&mut cm_hyst, &interp, 4, 3.0, 0.0, 4);

        let on = cm_hyst[GridVec::new(9, 6, 0)];
        let near = cm_hyst[GridVec::new(9, 7, 0)];
        let far = cm_hyst[GridVec::new(9, 10, 0)];
        assert!(on < near);
        assert!(near < far);
        assert_eq!(far, 100);
    }

    #[test]
    fn test_switchback() {
        // Forward along +x, then backing up while still facing +x
        let forward_then_back = vec![
            Pose2::new(0.0, 0.0, 0.0),
            Pose2::new(1.0, 0.0, 0.0),
            Pose2::new(2.0, 0.0, 0.0),
            Pose2::new(1.2, 0.0, 0.0),
        ];
        assert!(switchback_detect(&forward_then_back));

        let straight = vec![
            Pose2::new(0.0, 0.0, 0.0),
            Pose2::new(1.0, 0.0, 0.0),
            Pose2::new(2.0, 0.0, 0.0),
        ];
        assert!(!switchback_detect(&straight));

        // Reversing the whole way is consistent, not a switchback
        let all_reverse = vec![
            Pose2::new(2.0, 0.0, 0.0),
            Pose2::new(1.0, 0.0, 0.0),
            Pose2::new(0.0, 0.0, 0.0),
        ];
        assert!(!switchback_detect(&all_reverse));
    }
}
