//! # Euclidean motion cost
//!
//! The distance term of every edge cost: planar distance weighted by the
//! inverse maximum velocity, plus a yaw term weighted by the inverse maximum
//! angular velocity. Planar distances are integer square roots of small
//! integers, so a lookup table covers the hot path.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::grid::GridVec;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const TABLE_SIZE: usize = 1024;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EuclidCost {
    /// Cost per cell of planar travel
    pub lin: f32,

    /// Cost per yaw bucket of turning
    pub ang: f32,

    table: Vec<f32>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EuclidCost {
    pub fn new(max_vel: f32, max_ang_vel: f32, weight_ang_vel: f32) -> Self {
        let lin = 1.0 / max_vel;
        let ang = weight_ang_vel / max_ang_vel;
        let table = (0..TABLE_SIZE)
            .map(|sqlen| (sqlen as f32).sqrt() * lin)
            .collect();
        Self { lin, ang, table }
    }

    /// Planar cost of a rough offset.
    pub fn rough(&self, d: GridVec) -> f32 {
        let sqlen = d.sqlen();
        if (sqlen as usize) < self.table.len() {
            self.table[sqlen as usize]
        } else {
            (sqlen as f32).sqrt() * self.lin
        }
    }

    /// Full cost of an offset, with the yaw component reduced to its
    /// shortest-angle representative.
    pub fn full(&self, d: GridVec, angles: i32) -> f32 {
        self.rough(d) + (self.ang * d.cycle_signed(angles).yaw as f32).abs()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_matches_direct() {
        let ec = EuclidCost::new(0.3, 0.6, 1.0);

        for d in [
            GridVec::new(1, 0, 0),
            GridVec::new(3, 4, 0),
            GridVec::new(-2, 7, 0),
            GridVec::new(40, 40, 0),
        ] {
            let direct = d.len() / 0.3;
            assert!((ec.rough(d) - direct).abs() < 1e-4);
        }
    }

    #[test]
    fn test_yaw_shortest_angle() {
        let ec = EuclidCost::new(0.3, 0.6, 1.0);
        let angles = 16;

        // 15 buckets forward is one bucket backwards
        let a = ec.full(GridVec::new(0, 0, 15), angles);
        let b = ec.full(GridVec::new(0, 0, -1), angles);
        assert!((a - b).abs() < 1e-6);
    }
}
