//! # Remembered obstacle map
//!
//! A 2-D grid of Binary Bayes filters fed by successive local costmap
//! updates, so obstacles that have left the sensor footprint keep
//! influencing the heuristic. Evidence is only written in an annulus around
//! the robot: the inner disc is the robot's own footprint (the sensor sees
//! the robot, not the world), the outer bound drops returns too far away to
//! trust.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::bbf::{probability_to_log_odds, BinaryBayesFilter};
use crate::grid::{GridVec, Gridmap};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The remembered map and its baked cost layer.
#[derive(Debug, Clone)]
pub struct RememberedMap {
    bbf: Gridmap<BinaryBayesFilter>,

    /// Probability scaled to [0, 100], rebuilt by [`RememberedMap::bake`]
    /// after each evidence pass so cost reads are a plain lookup.
    cost: Gridmap<u8>,
}

/// Evidence configuration in log-odds, converted from the configured hit and
/// miss probabilities.
#[derive(Debug, Clone, Copy)]
pub struct RememberEvidence {
    pub hit_log_odds: f32,
    pub miss_log_odds: f32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RememberEvidence {
    pub fn from_probabilities(hit_prob: f32, miss_prob: f32) -> Self {
        Self {
            hit_log_odds: probability_to_log_odds(hit_prob),
            miss_log_odds: probability_to_log_odds(miss_prob),
        }
    }
}

impl RememberedMap {
    pub fn new(width: i32, height: i32) -> Self {
        let size = GridVec::new(width.max(1), height.max(1), 1);
        Self {
            bbf: Gridmap::new(size, BinaryBayesFilter::new()).unwrap(),
            cost: Gridmap::new(size, 0u8).unwrap(),
        }
    }

    /// Reset every cell to the uninformed prior.
    pub fn clear(&mut self) {
        self.bbf.clear(BinaryBayesFilter::new());
        self.cost.clear(0);
    }

    /// Apply one costmap update's evidence.
    ///
    /// `updates` holds the min-over-yaw cost of the latest update patch,
    /// -1 where the patch didn't cover the cell. `center` is the robot's
    /// rough cell. Each covered cell inside the annulus receives exactly one
    /// evidence application: hit for lethal, miss for observed free.
    pub fn remember(
        &mut self,
        updates: &Gridmap<i8>,
        center: GridVec,
        evidence: RememberEvidence,
        ignore_range: i32,
        ignore_range_max: i32,
    ) {
        let size = self.bbf.size();
        let sq_min = ignore_range * ignore_range;
        let sq_max = ignore_range_max * ignore_range_max;

        for x in 0..size.x {
            for y in 0..size.y {
                let p = GridVec::new(x, y, 0);
                let sqlen = (p - center.rough()).sqlen();
                if sqlen <= sq_min || sqlen >= sq_max {
                    continue;
                }

                let c = updates[p];
                if c == 100 {
                    self.bbf[p].update(evidence.hit_log_odds);
                } else if c >= 0 {
                    self.bbf[p].update(evidence.miss_log_odds);
                }
            }
        }
    }

    /// Rebuild the baked cost layer from the current beliefs. A fresh cell
    /// bakes to 0, a fully believed obstacle to 100.
    pub fn bake(&mut self) {
        let size = self.bbf.size();
        for x in 0..size.x {
            for y in 0..size.y {
                let p = GridVec::new(x, y, 0);
                self.cost[p] = (self.bbf[p].normalized() * 100.0).round() as u8;
            }
        }
    }

    /// Baked planning cost in [0, 100] at the given rough cell.
    pub fn cost(&self, p: GridVec) -> u8 {
        self.cost[p.rough()]
    }

    /// Probability at the given rough cell, rescaled so the clamp range maps
    /// onto [0, 1]. Used for the debug occupancy grid.
    pub fn normalized(&self, p: GridVec) -> f32 {
        self.bbf[p.rough()].normalized()
    }

    pub fn size(&self) -> GridVec {
        self.bbf.size()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn updates_with(cells: &[(i32, i32, i8)], w: i32, h: i32) -> Gridmap<i8> {
        let mut updates = Gridmap::new(GridVec::new(w, h, 1), -1i8).unwrap();
        for &(x, y, c) in cells {
            updates[GridVec::new(x, y, 0)] = c;
        }
        updates
    }

    #[test]
    fn test_annulus() {
        let mut map = RememberedMap::new(20, 20);
        let evidence = RememberEvidence::from_probabilities(0.8, 0.3);

        // Lethal cells at varying ranges from the robot at (10, 10)
        let updates = updates_with(&[(10, 11, 100), (10, 14, 100), (10, 19, 100)], 20, 20);
        map.remember(&updates, GridVec::new(10, 10, 0), evidence, 2, 6);
        map.bake();

        // Inside the footprint: no evidence
        assert_eq!(map.cost(GridVec::new(10, 11, 0)), 0);
        // Inside the annulus: hit applied
        assert!(map.cost(GridVec::new(10, 14, 0)) > 0);
        // Beyond the trust range: no evidence
        assert_eq!(map.cost(GridVec::new(10, 19, 0)), 0);
    }

    #[test]
    fn test_free_evidence_decays() {
        let mut map = RememberedMap::new(10, 10);
        let evidence = RememberEvidence::from_probabilities(0.8, 0.3);
        let center = GridVec::new(0, 0, 0);

        let hit = updates_with(&[(4, 0, 100)], 10, 10);
        map.remember(&hit, center, evidence, 2, 8);
        map.bake();
        let after_hit = map.cost(GridVec::new(4, 0, 0));
        assert!(after_hit > 0);

        // Observing the cell free drives the belief back down
        let miss = updates_with(&[(4, 0, 0)], 10, 10);
        for _ in 0..3 {
            map.remember(&miss, center, evidence, 2, 8);
        }
        map.bake();
        assert!(map.cost(GridVec::new(4, 0, 0)) < after_hit);
    }

    #[test]
    fn test_uncovered_cells_untouched() {
        let mut map = RememberedMap::new(10, 10);
        let evidence = RememberEvidence::from_probabilities(0.8, 0.3);

        let updates = updates_with(&[], 10, 10);
        map.remember(&updates, GridVec::new(5, 5, 0), evidence, 0, 10);
        map.bake();

        for x in 0..10 {
            for y in 0..10 {
                assert_eq!(map.cost(GridVec::new(x, y, 0)), 0);
            }
        }
    }
}
