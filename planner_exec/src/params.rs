//! # Planner parameters
//!
//! All configuration of the planner, loaded from a TOML file through
//! [`util::params::load`]. Metric thresholds are converted into grid units
//! when a map arrives.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cost weights of the kinematic cost function.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostParams {
    /// Penalty weight for arcs demanding deceleration below max velocity
    pub weight_decel: f32,

    /// Multiplier applied to backward motion
    pub weight_backward: f32,

    /// Weight of angular velocity in the distance term
    pub weight_ang_vel: f32,

    /// Weight of integrated costmap values
    pub weight_costmap: f32,

    /// Extra costmap weight applied while turning
    pub weight_costmap_turn: f32,

    /// Weight of the remembered obstacle map in the heuristic wavefront
    pub weight_remembered: f32,

    /// Weight of the hysteresis field along motion sweeps
    pub weight_hysteresis: f32,

    /// Constant added to every in-place turn
    pub cost_in_place_turn: f32,

    /// Distance from the previous path at which hysteresis saturates, in meters
    pub hysteresis_max_dist: f32,

    /// Zero-cost band width around the previous path, in meters
    pub hysteresis_expand: f32,
}

/// Remembered obstacle map configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RememberParams {
    /// Enable the remembered map
    pub remember_updates: bool,

    /// Probability evidence for a lethal observation
    pub remember_hit_prob: f32,

    /// Probability evidence for a free observation
    pub remember_miss_prob: f32,

    /// Inner radius of the evidence annulus, in meters
    pub hist_ignore_range: f32,

    /// Outer radius of the evidence annulus, in meters
    pub hist_ignore_range_max: f32,
}

/// Root parameter struct of the planner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerParams {
    /// Planning rate in Hz
    pub freq: f32,

    /// Lowest acceptable planning rate; its inverse is the search deadline
    pub freq_min: f32,

    /// Primitive search window, in meters
    pub search_range: f32,

    /// Seed the search with the sub-cell neighbours of the start
    pub antialias_start: bool,

    /// Declare DATA_MISSING when the costmap is older than this, in seconds.
    /// 0 disables the watchdog.
    pub costmap_watchdog: f32,

    pub max_vel: f32,
    pub max_ang_vel: f32,

    /// Smallest turn radius the platform can follow, in meters
    pub min_curve_radius: f32,

    /// Distance within which the full 3-D neighbourhood is searched, in meters
    pub local_range: f32,

    /// Extra wavefront overshoot allowance, in meters
    pub longcut_range: f32,

    /// Radius of the temporary escape goal search, in meters
    pub esc_range: f32,

    /// Start/goal relocation radius, in meters
    pub tolerance_range: f32,

    /// Start/goal relocation yaw tolerance, in radians
    pub tolerance_angle: f32,

    /// Goal acceptance tolerances
    pub goal_tolerance_lin: f32,
    pub goal_tolerance_ang: f32,

    /// Yaw convergence threshold that completes FINISHING, in radians
    pub goal_tolerance_ang_finish: f32,

    /// Cost assigned to unknown cells on ingest
    pub unknown_cost: i32,

    /// Updates overwrite the base map instead of max-merging into it
    pub overwrite_cost: bool,

    /// Dwell after emitting a path with a switchback, in seconds
    pub sw_wait: f32,

    /// Return the best partial path when the goal is unreachable in time
    pub find_best: bool,

    pub robot_frame: String,
    pub map_frame: String,

    /// Pose jump thresholds that clear the remembered map
    pub pos_jump: f64,
    pub yaw_jump: f64,

    /// Finish with the yaw of the raw goal rather than a relocated goal
    pub force_goal_orientation: bool,

    /// Pick a temporary escape goal when the real goal is unreachable
    pub temporary_escape: bool,

    /// Repair the heuristic on updates instead of rebuilding it
    pub fast_map_update: bool,

    /// Keep the last error tag while idle instead of resetting to GOING_WELL
    pub retain_last_error_status: bool,

    /// Abort the goal after this many failed cycles; -1 retries forever
    pub max_retry_num: i32,

    /// Frontier size cap of the main search, 0 for unbounded
    pub queue_size_limit: usize,

    /// Worker threads for the parallel sections
    pub num_threads: usize,

    /// Frontier nodes expanded per batch in the main search. 0 derives
    /// num_threads * 16.
    pub num_search_task: usize,

    /// Frontier nodes expanded per batch in the wavefront. 0 derives
    /// num_threads * 16.
    pub num_cost_estim_task: usize,

    pub cost: CostParams,
    pub remember: RememberParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CostParams {
    fn default() -> Self {
        Self {
            weight_decel: 50.0,
            weight_backward: 0.9,
            weight_ang_vel: 1.0,
            weight_costmap: 50.0,
            weight_costmap_turn: 0.0,
            weight_remembered: 1000.0,
            weight_hysteresis: 5.0,
            cost_in_place_turn: 30.0,
            hysteresis_max_dist: 0.1,
            hysteresis_expand: 0.1,
        }
    }
}

impl Default for RememberParams {
    fn default() -> Self {
        Self {
            remember_updates: false,
            remember_hit_prob: 0.6,
            remember_miss_prob: 0.3,
            hist_ignore_range: 0.6,
            hist_ignore_range_max: 1.25,
        }
    }
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            freq: 4.0,
            freq_min: 2.0,
            search_range: 0.4,
            antialias_start: false,
            costmap_watchdog: 0.0,
            max_vel: 0.3,
            max_ang_vel: 0.6,
            min_curve_radius: 0.1,
            local_range: 2.5,
            longcut_range: 0.0,
            esc_range: 0.25,
            tolerance_range: 0.25,
            tolerance_angle: 0.0,
            goal_tolerance_lin: 0.05,
            goal_tolerance_ang: 0.1,
            goal_tolerance_ang_finish: 0.05,
            unknown_cost: 100,
            overwrite_cost: false,
            sw_wait: 2.0,
            find_best: true,
            robot_frame: "base_link".to_owned(),
            map_frame: "map".to_owned(),
            pos_jump: 1.0,
            yaw_jump: 1.5,
            force_goal_orientation: true,
            temporary_escape: true,
            fast_map_update: false,
            retain_last_error_status: true,
            max_retry_num: -1,
            queue_size_limit: 0,
            num_threads: 1,
            num_search_task: 0,
            num_cost_estim_task: 0,
            cost: CostParams::default(),
            remember: RememberParams::default(),
        }
    }
}

impl PlannerParams {
    /// Batch size of the main search pop phase.
    pub fn search_task_num(&self) -> usize {
        if self.num_search_task > 0 {
            self.num_search_task
        } else {
            self.num_threads * 16
        }
    }

    /// Batch size of the wavefront pop phase.
    pub fn cost_estim_task_num(&self) -> usize {
        if self.num_cost_estim_task > 0 {
            self.num_cost_estim_task
        } else {
            self.num_threads * 16
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_toml() {
        let params: PlannerParams = toml::from_str(
            r#"
            max_vel = 0.5
            temporary_escape = false

            [cost]
            weight_costmap = 25.0
            "#,
        )
        .unwrap();

        assert_eq!(params.max_vel, 0.5);
        assert!(!params.temporary_escape);
        assert_eq!(params.cost.weight_costmap, 25.0);
        // Unset keys keep their defaults
        assert_eq!(params.freq, 4.0);
        assert_eq!(params.cost.weight_backward, 0.9);
    }

    #[test]
    fn test_derived_task_nums() {
        let mut params = PlannerParams::default();
        params.num_threads = 4;
        assert_eq!(params.search_task_num(), 64);
        params.num_search_task = 10;
        assert_eq!(params.search_task_num(), 10);
    }
}
