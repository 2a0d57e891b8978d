//! # Motion cache
//!
//! Swept cells and arc lengths for every feasible short-range primitive.
//! Straight primitives rasterise the segment between the two cell centres;
//! arc primitives follow the circle implied by the entry radius, blending
//! towards the exit circle so slightly drifted endpoints still sweep a
//! sensible corridor (the drift itself is rejected at planning time).
//!
//! Sweeps are half-open: they include the start cell and exclude the
//! endpoint, so chaining primitives along a path counts every cell once.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};
use std::f32::consts::{FRAC_PI_2, PI};

use crate::grid::{GridVec, GridVecF};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One primitive's precomputed sweep.
#[derive(Debug, Clone)]
pub struct MotionPage {
    swept: Vec<GridVec>,

    /// Arc length in grid units
    distance: f32,
}

/// All primitives for one discretisation, keyed by start yaw bucket and
/// (relative cell, end yaw bucket).
#[derive(Debug, Clone)]
pub struct MotionCache {
    angles: i32,
    pages: Vec<HashMap<GridVec, MotionPage>>,
    max_range: GridVec,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Rasterise the straight segment from the origin towards `d` at yaw 0.
///
/// Returns the half-open swept cells: the origin is included, `d` itself is
/// not. Used directly by the heuristic wavefront's edge sweeps.
pub fn line_sweep(d: GridVec) -> Vec<GridVec> {
    let dist = d.len().floor() as i32;
    if dist < 1 {
        return vec![GridVec::new(0, 0, 0)];
    }

    let dpx = d.x as f32 / dist as f32;
    let dpy = d.y as f32 / dist as f32;

    let mut cells = Vec::with_capacity(dist as usize);
    let mut pos = GridVecF::new(0.0, 0.0, 0.0);
    for _ in 0..dist {
        let ipos = pos.round();
        if cells.last() != Some(&ipos) {
            cells.push(ipos);
        }
        pos.x += dpx;
        pos.y += dpy;
    }
    cells
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionPage {
    pub fn swept(&self) -> &[GridVec] {
        &self.swept
    }

    /// Arc length in grid units.
    pub fn distance(&self) -> f32 {
        self.distance
    }
}

impl MotionCache {
    /// Build the full 3-D cache for a map with the given resolutions, over a
    /// window of `range` cells.
    pub fn new(linear_resolution: f32, angular_resolution: f32, range: i32) -> Self {
        let angles = (PI * 2.0 / angular_resolution).round() as i32;
        Self::build(linear_resolution, angular_resolution, range, angles)
    }

    /// Build the yaw-collapsed cache (straight sweeps only), used by the
    /// rough planner.
    pub fn new_linear(linear_resolution: f32, range: i32) -> Self {
        Self::build(linear_resolution, PI * 2.0, range, 1)
    }

    fn build(linear_resolution: f32, angular_resolution: f32, range: i32, angles: i32) -> Self {
        let mut pages: Vec<HashMap<GridVec, MotionPage>> = Vec::with_capacity(angles as usize);
        let mut max_range = GridVec::new(0, 0, 0);

        for syaw in 0..angles {
            let yaw = syaw as f32 * angular_resolution;
            let mut page_map = HashMap::new();

            for dx in -range..=range {
                for dy in -range..=range {
                    let d_plane = GridVec::new(dx, dy, 0);
                    if (dx == 0 && dy == 0) || d_plane.sqlen() > range * range {
                        continue;
                    }

                    for eyaw in 0..angles {
                        let rel = GridVec::new(0, 0, eyaw - syaw).cycle_signed(angles).yaw;
                        let d_yaw = rel as f32 * angular_resolution;

                        // Arcs of 90 degrees or more are always rejected by
                        // the cost function, no page needed
                        if rel != 0 && d_yaw.abs() >= FRAC_PI_2 {
                            continue;
                        }

                        let d = GridVec::new(dx, dy, eyaw);
                        let page = if rel == 0 {
                            Self::sweep_straight(d_plane, syaw, angles)
                        } else {
                            Self::sweep_arc(
                                d_plane,
                                yaw,
                                d_yaw,
                                linear_resolution,
                                angular_resolution,
                                angles,
                                d,
                            )
                        };

                        for c in &page.swept {
                            max_range.x = max_range.x.max(c.x.abs());
                            max_range.y = max_range.y.max(c.y.abs());
                        }
                        page_map.insert(d, page);
                    }
                }
            }

            pages.push(page_map);
        }

        Self {
            angles,
            pages,
            max_range,
        }
    }

    fn sweep_straight(d_plane: GridVec, syaw: i32, angles: i32) -> MotionPage {
        let swept = line_sweep(d_plane)
            .into_iter()
            .map(|c| GridVec::new(c.x, c.y, syaw).cycle_unsigned(angles))
            .collect();
        MotionPage {
            swept,
            distance: d_plane.len(),
        }
    }

    fn sweep_arc(
        d_plane: GridVec,
        yaw: f32,
        d_yaw: f32,
        linear_resolution: f32,
        angular_resolution: f32,
        angles: i32,
        endpoint: GridVec,
    ) -> MotionPage {
        let (sin_v, cos_v) = d_yaw.sin_cos();

        // Motion in the start frame, giving the entry and exit radii
        let motion = GridVecF::new(
            d_plane.x as f32 * linear_resolution,
            d_plane.y as f32 * linear_resolution,
            0.0,
        )
        .rotate(-yaw);
        let r1 = motion.y + motion.x * cos_v / sin_v;
        let r2 = motion.x / sin_v;

        // Circle centres in the map frame, at the start and end poses
        let yaw_e = yaw + d_yaw;
        let cx_s = r1 * (yaw + FRAC_PI_2).cos();
        let cy_s = r1 * (yaw + FRAC_PI_2).sin();
        let cx_e = d_plane.x as f32 * linear_resolution + r2 * (yaw_e + FRAC_PI_2).cos();
        let cy_e = d_plane.y as f32 * linear_resolution + r2 * (yaw_e + FRAC_PI_2).sin();

        let steps = d_plane.len().ceil().max(1.0) as i32;
        let inter = 1.0 / d_plane.len();

        let mut registered: HashSet<GridVec> = HashSet::new();
        registered.insert(endpoint);
        let mut swept = Vec::new();
        let mut distance = 0.0f32;
        let mut pos_prev = GridVecF::new(0.0, 0.0, 0.0);

        for i in 0..steps {
            let t = i as f32 * inter;
            if t >= 1.0 {
                break;
            }

            let r = r1 * (1.0 - t) + r2 * t;
            let cx = cx_s * (1.0 - t) + cx_e * t;
            let cy = cy_s * (1.0 - t) + cy_e * t;
            let cyaw = yaw + t * d_yaw;

            let pos = GridVecF::new(
                (cx - r * (cyaw + FRAC_PI_2).cos()) / linear_resolution,
                (cy - r * (cyaw + FRAC_PI_2).sin()) / linear_resolution,
                cyaw / angular_resolution,
            );
            let cell = pos.round().cycle_unsigned(angles);
            if registered.insert(cell) {
                swept.push(cell);
            }

            distance += (pos - pos_prev).len();
            pos_prev = pos;
        }
        distance += (endpoint.as_f() - GridVecF::new(pos_prev.x, pos_prev.y, 0.0)).len();

        MotionPage { swept, distance }
    }

    /// Look up the primitive from yaw bucket `syaw` to relative cell
    /// (d.x, d.y) at end yaw bucket d.yaw. None means the primitive is not
    /// representable and must be treated as infeasible.
    pub fn find(&self, syaw: i32, d: GridVec) -> Option<&MotionPage> {
        let syaw = syaw.rem_euclid(self.angles) as usize;
        self.pages[syaw].get(&d.cycle_unsigned(self.angles))
    }

    /// Largest planar extent any sweep reaches, used to size the boundary
    /// band in which primitives are rejected.
    pub fn max_range(&self) -> GridVec {
        self.max_range
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const LIN_RES: f32 = 0.1;
    const ANG_RES: f32 = PI * 2.0 / 16.0;

    #[test]
    fn test_line_sweep_excludes_endpoint() {
        let cells = line_sweep(GridVec::new(3, 0, 0));
        assert_eq!(
            cells,
            vec![
                GridVec::new(0, 0, 0),
                GridVec::new(1, 0, 0),
                GridVec::new(2, 0, 0)
            ]
        );
    }

    #[test]
    fn test_line_sweep_single_step() {
        let cells = line_sweep(GridVec::new(1, 1, 0));
        assert_eq!(cells, vec![GridVec::new(0, 0, 0)]);
    }

    #[test]
    fn test_straight_page() {
        let cache = MotionCache::new(LIN_RES, ANG_RES, 4);

        let page = cache.find(0, GridVec::new(4, 0, 0)).unwrap();
        assert!((page.distance() - 4.0).abs() < 1e-5);
        assert!(page.swept().contains(&GridVec::new(0, 0, 0)));
        assert!(page.swept().contains(&GridVec::new(3, 0, 0)));
        assert!(!page.swept().contains(&GridVec::new(4, 0, 0)));
        // Straight sweeps stay in the start yaw bucket
        assert!(page.swept().iter().all(|c| c.yaw == 0));
    }

    #[test]
    fn test_arc_page_present_and_plausible() {
        let cache = MotionCache::new(LIN_RES, ANG_RES, 4);

        // A gentle left arc: forward 4, up 1, one yaw bucket
        let page = cache.find(0, GridVec::new(4, 1, 1)).unwrap();
        assert!(page.distance() >= 4.0);
        assert!(page.distance() < 8.0);
        assert!(!page.swept().is_empty());
    }

    #[test]
    fn test_sharp_turns_not_cached() {
        let cache = MotionCache::new(LIN_RES, ANG_RES, 4);

        // A 90 degree turn over one cell cannot be a single primitive
        assert!(cache.find(0, GridVec::new(1, 1, 4)).is_none());
    }

    #[test]
    fn test_linear_cache_is_rough() {
        let cache = MotionCache::new_linear(LIN_RES, 4);

        assert!(cache.find(0, GridVec::new(3, 2, 0)).is_some());
        let page = cache.find(0, GridVec::new(3, 2, 0)).unwrap();
        assert!(page.swept().iter().all(|c| c.yaw == 0));
    }

    #[test]
    fn test_max_range_bounded() {
        let cache = MotionCache::new(LIN_RES, ANG_RES, 4);
        let mr = cache.max_range();
        // Sweeps exclude their endpoints, so the extent sits just inside the
        // window, with a little slack for arc bulge
        assert!(mr.x >= 3 && mr.y >= 3);
        assert!(mr.x <= 6 && mr.y <= 6);
    }
}
