//! # Rotation / radius cache
//!
//! For every (start yaw bucket, relative cell, end yaw bucket) primitive in
//! the search window this cache stores the motion expressed in the start
//! pose's frame and the two turn radii implied by the endpoint.
//!
//! With the start tangent along +x, a circular arc of signed radius r turned
//! through angle t ends at x = r sin t, y = r (1 - cos t). Inverting each
//! relation gives two radius estimates from an observed endpoint:
//! r1 = y + x / tan t (from the y relation with the x one substituted) and
//! r2 = x / sin t. They agree exactly when the endpoint really lies on such
//! an arc; a mismatch means the primitive would drift between two circles
//! and is rejected at planning time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::grid::{GridVec, GridVecF};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RotationCache {
    range: i32,
    angles: i32,

    /// One page per start yaw bucket
    pages: Vec<Page>,
}

#[derive(Debug, Clone)]
struct Page {
    /// Motion in the start frame: x, y in meters, yaw in radians
    /// (shortest-angle)
    motions: Vec<GridVecF>,

    /// (entry radius, exit radius) in meters
    radii: Vec<(f32, f32)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RotationCache {
    /// Precompute all primitives within `range` cells for a map with the
    /// given resolutions.
    pub fn new(linear_resolution: f32, angular_resolution: f32, range: i32) -> Self {
        let angles = (std::f32::consts::PI * 2.0 / angular_resolution).round() as i32;
        let window = (range * 2 + 1) as usize;

        let mut pages = Vec::with_capacity(angles as usize);
        for syaw in 0..angles {
            let yaw = syaw as f32 * angular_resolution;
            let mut motions = Vec::with_capacity(window * window * angles as usize);
            let mut radii = Vec::with_capacity(window * window * angles as usize);

            for dx in -range..=range {
                for dy in -range..=range {
                    for eyaw in 0..angles {
                        let rel_yaw = GridVec::new(0, 0, eyaw - syaw).cycle_signed(angles).yaw;
                        let d_yaw = rel_yaw as f32 * angular_resolution;

                        // Displacement rotated into the start frame
                        let motion = GridVecF::new(
                            dx as f32 * linear_resolution,
                            dy as f32 * linear_resolution,
                            d_yaw,
                        )
                        .rotate(-yaw);
                        let motion = GridVecF::new(motion.x, motion.y, d_yaw);

                        let r = if rel_yaw == 0 {
                            (f32::INFINITY, f32::INFINITY)
                        } else {
                            let (sin_v, cos_v) = d_yaw.sin_cos();
                            let r1 = motion.y + motion.x * cos_v / sin_v;
                            let r2 = motion.x / sin_v;
                            (r1, r2)
                        };

                        motions.push(motion);
                        radii.push(r);
                    }
                }
            }

            pages.push(Page { motions, radii });
        }

        Self {
            range,
            angles,
            pages,
        }
    }

    fn addr(&self, d: GridVec, eyaw: i32) -> usize {
        let window = self.range * 2 + 1;
        let ix = d.x + self.range;
        let iy = d.y + self.range;
        (((ix * window) + iy) * self.angles + eyaw.rem_euclid(self.angles)) as usize
    }

    /// Motion of the primitive from `(0, 0, syaw)` to `(d.x, d.y, eyaw)`
    /// expressed in the start frame. x, y in meters, yaw in radians reduced
    /// to the shortest angle.
    pub fn motion(&self, syaw: i32, d: GridVec, eyaw: i32) -> GridVecF {
        self.pages[syaw.rem_euclid(self.angles) as usize].motions[self.addr(d, eyaw)]
    }

    /// Entry and exit radii in meters of the same primitive.
    pub fn radii(&self, syaw: i32, d: GridVec, eyaw: i32) -> (f32, f32) {
        self.pages[syaw.rem_euclid(self.angles) as usize].radii[self.addr(d, eyaw)]
    }

    pub fn angles(&self) -> i32 {
        self.angles
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const LIN_RES: f32 = 0.1;
    const ANG_RES: f32 = std::f32::consts::PI * 2.0 / 16.0;

    #[test]
    fn test_straight_motion() {
        let cache = RotationCache::new(LIN_RES, ANG_RES, 4);

        // Straight ahead at yaw 0
        let m = cache.motion(0, GridVec::new(4, 0, 0), 0);
        assert!((m.x - 0.4).abs() < 1e-5);
        assert!(m.y.abs() < 1e-5);
        assert!(m.yaw.abs() < 1e-5);

        // Straight ahead at yaw bucket 4 (90 degrees): the map-frame +y
        // motion is +x in the start frame
        let m = cache.motion(4, GridVec::new(0, 4, 0), 4);
        assert!((m.x - 0.4).abs() < 1e-5);
        assert!(m.y.abs() < 1e-5);
    }

    #[test]
    fn test_consistent_arc_radii() {
        let cache = RotationCache::new(LIN_RES, ANG_RES, 8);

        // Build an exact arc endpoint: r = 0.5 m, one yaw bucket turn
        let t = ANG_RES;
        let r = 0.5f32;
        let ex = (r * t.sin() / LIN_RES).round() as i32;
        let ey = (r * (1.0 - t.cos()) / LIN_RES).round() as i32;
        let (r1, r2) = cache.radii(0, GridVec::new(ex, ey, 0), 1);

        // Rounding to cells perturbs the endpoint, so allow a cell of slack
        assert!((r1 - r2).abs() < 1.5 * LIN_RES);
        assert!(r1 > 0.0 && r2 > 0.0);
    }

    #[test]
    fn test_wraparound_turn_is_short() {
        let cache = RotationCache::new(LIN_RES, ANG_RES, 4);

        // Turning from bucket 15 to bucket 0 crosses the seam but is a
        // single-bucket turn
        let m = cache.motion(15, GridVec::new(4, -1, 0), 0);
        assert!((m.yaw - ANG_RES).abs() < 1e-5);
    }
}
