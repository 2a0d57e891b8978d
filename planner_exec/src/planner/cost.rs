//! # Search cost models
//!
//! Two concrete [`SearchModel`]s: the kinematic model driving the live
//! planner, and the rough model answering one-shot plan requests on the
//! yaw-collapsed grid.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::f32::consts::PI;

use log::warn;

use crate::euclid::EuclidCost;
use crate::grid::{GridVec, Gridmap};
use crate::heuristic::HeuristicField;
use crate::motion::{MotionCache, RotationCache};
use crate::params::CostParams;
use crate::search::{SearchModel, VecWithCost};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything the kinematic cost function reads, borrowed immutably from the
/// planner for the duration of one search.
pub struct KinematicModel<'a> {
    pub cm: &'a Gridmap<u8>,
    pub cm_hyst: &'a Gridmap<u8>,
    pub use_hysteresis: bool,
    pub heuristic: &'a HeuristicField,
    pub motion_cache: &'a MotionCache,
    pub rot_cache: &'a RotationCache,
    pub euclid: &'a EuclidCost,
    pub coeff: &'a CostParams,
    pub search_list: &'a [GridVec],
    pub search_list_rough: &'a [GridVec],

    /// Start cells of the current search, for the locality predicate used
    /// by both the neighbourhood switch and the angular heuristic term
    pub start_cells: Vec<GridVec>,

    pub linear_resolution: f32,
    pub angular_resolution: f32,
    pub angles: i32,
    pub local_range: i32,
    pub min_curve_radius: f32,
    pub max_vel: f32,
    pub max_ang_vel: f32,

    /// Aspect gate for straight primitives: 2 / tan(angular resolution). A
    /// straight move flatter than this drifts sideways by more than the
    /// half-bucket rounding window per unit advance, i.e. it is an arc that
    /// was rounded into a straight, so it is rejected as a disguised lateral
    /// step.
    pub angle_resolution_aspect: f32,

    pub min_boundary: GridVec,
    pub max_boundary: GridVec,

    pub goal_tolerance_lin: i32,
    pub goal_tolerance_ang: i32,
}

/// The yaw-collapsed model used by one-shot plan requests: costmap and
/// straight-line primitives only, euclidean heuristic.
pub struct RoughModel<'a> {
    pub cm_rough: &'a Gridmap<u8>,
    pub motion_cache_linear: &'a MotionCache,
    pub euclid: &'a EuclidCost,
    pub weight_costmap: f32,
    pub linear_resolution: f32,
    pub search_list_rough: &'a [GridVec],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> KinematicModel<'a> {
    /// Whether `p` is within the local (full 3-D) search range of a start.
    fn is_local(&self, p: GridVec) -> bool {
        let local_range_sq = self.local_range * self.local_range;
        self.start_cells
            .iter()
            .any(|s| (*s - p).sqlen() < local_range_sq)
    }

    fn in_place_turn_cost(&self, s: GridVec, d: GridVec) -> Option<f32> {
        let mut sum = 0u32;
        let dir = if d.yaw < 0 { -1 } else { 1 };
        let mut pos = s;
        for _ in 0..d.yaw.abs() {
            pos.yaw += dir;
            pos = pos.cycle_unsigned(self.angles);
            let c = self.cm[pos];
            if c > 99 {
                return None;
            }
            sum += c as u32;
        }

        let cost = sum as f32 * self.angular_resolution * (self.euclid.ang / self.euclid.lin)
            + sum as f32 * self.angular_resolution * self.coeff.weight_costmap_turn / 100.0;
        Some(self.coeff.cost_in_place_turn + cost)
    }

    /// Integrate costmap and hysteresis along the primitive's sweep.
    /// Returns (costmap sum, hysteresis sum, cell count, arc length) or None
    /// on a lethal cell.
    fn integrate_sweep(&self, s: GridVec, d_index: GridVec) -> Option<(f32, f32, usize, f32)> {
        let page = self.motion_cache.find(s.yaw, d_index)?;

        let mut sum = 0u32;
        let mut sum_hyst = 0u32;
        for sd in page.swept() {
            let pos = GridVec::new(s.x + sd.x, s.y + sd.y, sd.yaw);
            let c = self.cm[pos];
            if c > 99 {
                return None;
            }
            sum += c as u32;

            if self.use_hysteresis {
                sum_hyst += self.cm_hyst[pos] as u32;
            }
        }

        Some((
            sum as f32,
            sum_hyst as f32,
            page.swept().len().max(1),
            page.distance(),
        ))
    }
}

impl<'a> SearchModel for KinematicModel<'a> {
    fn cost(&self, s: GridVec, e: GridVec, _starts: &[VecWithCost], _goal: GridVec) -> Option<f32> {
        let d = (e - s).cycle_signed(self.angles);
        let mut cost = self.euclid.full(d, self.angles);

        if d.x == 0 && d.y == 0 {
            return self.in_place_turn_cost(s, d);
        }

        let motion = self.rot_cache.motion(s.yaw, GridVec::new(d.x, d.y, 0), e.yaw);
        let motion_grid_x = (motion.x / self.linear_resolution).round() as i32;
        let motion_grid_y = (motion.y / self.linear_resolution).round() as i32;

        if motion_grid_x == 0 && motion_grid_y != 0 {
            // A purely lateral step is not non-holonomic
            return None;
        }
        if motion.yaw.abs() >= 2.0 * PI / 4.0 {
            // Over 90 degree turn must be separated into two primitives
            return None;
        }

        let dist = motion.len();

        if motion.x < 0.0 {
            // Going backward
            cost *= 1.0 + self.coeff.weight_backward;
        }

        if d.yaw == 0 {
            // Go-straight
            if motion_grid_x == 0 {
                return None; // side slip
            }
            let aspect = motion.x / motion.y;
            if aspect.abs() < self.angle_resolution_aspect {
                return None; // large y offset
            }
            cost += self.euclid.ang
                * (1.0 / aspect).abs()
                * self.angular_resolution
                / (PI * 2.0);

            let d_index = GridVec::new(d.x, d.y, e.yaw);
            let (sum, sum_hyst, num, distf) = self.integrate_sweep(s, d_index)?;
            cost += sum * self.linear_resolution * distf * self.coeff.weight_costmap
                / (100.0 * num as f32);
            cost += sum_hyst * self.linear_resolution * distf * self.coeff.weight_hysteresis
                / (100.0 * num as f32);
        } else {
            // Curve
            if (motion.x * motion.y * motion.yaw) < 0.0 {
                return None;
            }
            if d.sqlen() < 3 * 3 {
                return None;
            }

            let (r1, r2) = self.rot_cache.radii(s.yaw, GridVec::new(d.x, d.y, 0), e.yaw);

            // Curvature at the start pose and the end pose must be the same
            if (r1 - r2).abs() >= self.linear_resolution * 1.5 {
                // Drifted
                return None;
            }

            let curv_radius = (r1 + r2) / 2.0;
            if curv_radius.abs() < self.min_curve_radius {
                return None;
            }

            // Ignore the boundary band where sweeps would leave the map
            if s.x < self.min_boundary.x
                || s.y < self.min_boundary.y
                || s.x >= self.max_boundary.x
                || s.y >= self.max_boundary.y
            {
                return None;
            }

            if (self.max_vel / r1).abs() > self.max_ang_vel {
                // Curve deceleration penalty
                let vel = curv_radius.abs() * self.max_ang_vel;
                cost += dist * (vel / self.max_vel).abs() * self.coeff.weight_decel;
            }

            let d_index = GridVec::new(d.x, d.y, e.yaw);
            let (sum, sum_hyst, num, distf) = self.integrate_sweep(s, d_index)?;
            cost += sum * self.linear_resolution * distf * self.coeff.weight_costmap
                / (100.0 * num as f32);
            cost += sum
                * self.angular_resolution
                * d.yaw.abs() as f32
                * self.coeff.weight_costmap_turn
                / (100.0 * num as f32);
            cost += sum_hyst * self.linear_resolution * distf * self.coeff.weight_hysteresis
                / (100.0 * num as f32);
        }

        Some(cost)
    }

    fn heuristic(&self, p: GridVec, goal: GridVec) -> f32 {
        let cost = self.heuristic.value(p);
        if cost.is_infinite() {
            return f32::INFINITY;
        }

        if !self.is_local(p) {
            // Outside the local range the search doesn't resolve yaw
            return cost;
        }
        let dyaw = (p - goal).cycle_signed(self.angles).yaw;
        cost + self.euclid.ang * dyaw.abs() as f32
    }

    fn neighborhood(&self, p: GridVec, _starts: &[VecWithCost], _goal: GridVec) -> &[GridVec] {
        if self.is_local(p) {
            self.search_list
        } else {
            self.search_list_rough
        }
    }

    fn is_goal(&self, p: GridVec, goal: GridVec) -> bool {
        let remain = (p - goal).cycle_signed(self.angles);
        remain.sqlen() <= self.goal_tolerance_lin * self.goal_tolerance_lin
            && remain.yaw.abs() <= self.goal_tolerance_ang
    }

    fn progress(&self, _best_so_far: &[GridVec]) -> bool {
        warn!("Search timed out");
        true
    }
}

impl<'a> SearchModel for RoughModel<'a> {
    fn cost(&self, s: GridVec, e: GridVec, _starts: &[VecWithCost], _goal: GridVec) -> Option<f32> {
        let d = (e - s).rough();
        let mut cost = self.euclid.rough(d);

        let page = self.motion_cache_linear.find(0, d)?;
        let mut sum = 0u32;
        for sd in page.swept() {
            let pos = GridVec::new(s.x + sd.x, s.y + sd.y, 0);
            let c = self.cm_rough[pos];
            if c > 99 {
                return None;
            }
            sum += c as u32;
        }
        let num = page.swept().len().max(1);
        cost += sum as f32 * self.linear_resolution * page.distance() * self.weight_costmap
            / (100.0 * num as f32);

        Some(cost)
    }

    fn heuristic(&self, p: GridVec, goal: GridVec) -> f32 {
        self.euclid.rough(goal - p)
    }

    fn neighborhood(&self, _p: GridVec, _starts: &[VecWithCost], _goal: GridVec) -> &[GridVec] {
        self.search_list_rough
    }

    fn is_goal(&self, p: GridVec, goal: GridVec) -> bool {
        p.rough() == goal.rough()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
