//! # Planner orchestrator
//!
//! Owns every grid and cache, ingests costmaps and goals, and drives the
//! plan cycle: heuristic maintenance, the kinematic A* search, hysteresis
//! rebuild, escape behaviour and the status state machine.
//!
//! The orchestrator is single-threaded; the parallel sections inside the
//! heuristic wavefront and the search see the grids through read-only
//! borrows only.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod cost;
pub mod hysteresis;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};

use msgs_if::costmap::{Costmap3dMsg, Costmap3dUpdateMsg, CostmapMsgError, MapMeta3d};
use msgs_if::plan::{MetricPathMsg, OccupancyGridMsg, PlanRequest, PointCloudMsg};
use msgs_if::pose::{Pose2, PoseStamped};
use msgs_if::status::{PlannerErrorKind, PlannerState, PlannerStatusMsg};
use msgs_if::tf::TransformProvider;

use crate::euclid::EuclidCost;
use crate::grid::{GridError, GridVec, GridVecF, Gridmap};
use crate::heuristic::{EstimConfig, HeuristicField};
use crate::jump::JumpDetector;
use crate::metric::GridConverter;
use crate::motion::{MotionCache, RotationCache};
use crate::params::PlannerParams;
use crate::remembered::{RememberEvidence, RememberedMap};
use crate::search::{GridAstar, SearchResult, VecWithCost};

use cost::{KinematicModel, RoughModel};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The planner node state.
pub struct Planner3d {
    params: PlannerParams,
    pool: rayon::ThreadPool,

    // Map discretisation, present once the first map arrived
    map_info: Option<MapMeta3d>,
    conv: Option<GridConverter>,
    map_frame: String,

    // Grids
    cm: Gridmap<u8>,
    cm_base: Gridmap<u8>,
    cm_rough: Gridmap<u8>,
    cm_rough_base: Gridmap<u8>,
    cm_hyst: Gridmap<u8>,
    cm_updates: Gridmap<i8>,
    heuristic: HeuristicField,
    remembered: RememberedMap,
    evidence: RememberEvidence,

    // Search machinery
    astar: GridAstar,
    motion_cache: MotionCache,
    motion_cache_linear: MotionCache,
    rot_cache: RotationCache,
    euclid: EuclidCost,
    search_list: Vec<GridVec>,
    search_list_rough: Vec<GridVec>,

    // Metric parameters converted to grid units on map ingest
    range: i32,
    local_range: i32,
    longcut_range: i32,
    esc_range: i32,
    esc_angle: i32,
    tolerance_range: i32,
    tolerance_angle: i32,
    goal_tolerance_lin: i32,
    goal_tolerance_ang: i32,
    hist_ignore_range: i32,
    hist_ignore_range_max: i32,
    angle_resolution_aspect: f32,
    min_boundary: GridVec,
    max_boundary: GridVec,

    // Lifecycle state
    status: PlannerStatusMsg,
    has_map: bool,
    has_goal: bool,
    has_start: bool,
    goal_updated: bool,
    has_hysteresis: bool,
    escaping: bool,
    publish_stop: bool,
    start: Pose2,
    goal: Pose2,
    goal_raw: Pose2,
    cnt_stuck: i32,
    last_costmap: Option<Instant>,
    last_logged_error: PlannerErrorKind,
    jump: JumpDetector,
}

/// Everything one planning cycle produces for the outside world.
#[derive(Debug, Clone, Default)]
pub struct CycleOutput {
    /// Path to publish; empty paths stop the follower
    pub path: Option<MetricPathMsg>,

    pub status: PlannerStatusMsg,

    /// Action feedback: the pose planning started from
    pub feedback: Option<Pose2>,

    /// Debug markers for the searched start and end
    pub start_pose: Option<PoseStamped>,
    pub end_pose: Option<PoseStamped>,

    /// Requested dwell before the next cycle (switchback handover)
    pub dwell: Option<Duration>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("No costmap has been received yet")]
    NoMap,

    #[error("Pose frame [{got}] must be the map frame [{expected}]")]
    FrameMismatch { expected: String, got: String },

    #[error("Invalid costmap message: {0}")]
    BadCostmap(#[from] CostmapMsgError),

    #[error("Grid allocation failed: {0}")]
    Grid(#[from] GridError),

    #[error("Given start or goal is not on the map")]
    OutsideMap,

    #[error("Given start or goal is in rock")]
    InRock,

    #[error("Path plan failed (goal unreachable)")]
    PathNotFound,

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Planner3d {
    pub fn new(params: PlannerParams) -> Result<Self, PlannerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.num_threads.max(1))
            .build()
            .map_err(|e| PlannerError::ThreadPool(e.to_string()))?;

        let mut astar = GridAstar::new();
        astar.set_queue_size_limit(params.queue_size_limit);
        astar.set_search_task_num(params.search_task_num());

        let evidence = RememberEvidence::from_probabilities(
            params.remember.remember_hit_prob,
            params.remember.remember_miss_prob,
        );
        let euclid = EuclidCost::new(params.max_vel, params.max_ang_vel, params.cost.weight_ang_vel);
        let jump = JumpDetector::new(params.pos_jump, params.yaw_jump);
        let map_frame = params.map_frame.clone();

        let placeholder = GridVec::new(1, 1, 1);
        Ok(Self {
            pool,
            map_info: None,
            conv: None,
            map_frame,
            cm: Gridmap::new(placeholder, 0)?,
            cm_base: Gridmap::new(placeholder, 0)?,
            cm_rough: Gridmap::new(placeholder, 0)?,
            cm_rough_base: Gridmap::new(placeholder, 0)?,
            cm_hyst: Gridmap::new(placeholder, 100)?,
            cm_updates: Gridmap::new(placeholder, -1)?,
            heuristic: HeuristicField::new(),
            remembered: RememberedMap::new(1, 1),
            evidence,
            astar,
            motion_cache: MotionCache::new_linear(1.0, 1),
            motion_cache_linear: MotionCache::new_linear(1.0, 1),
            rot_cache: RotationCache::new(1.0, std::f32::consts::PI / 2.0, 1),
            euclid,
            search_list: Vec::new(),
            search_list_rough: Vec::new(),
            range: 0,
            local_range: 0,
            longcut_range: 0,
            esc_range: 0,
            esc_angle: 0,
            tolerance_range: 0,
            tolerance_angle: 0,
            goal_tolerance_lin: 0,
            goal_tolerance_ang: 0,
            hist_ignore_range: 0,
            hist_ignore_range_max: 0,
            angle_resolution_aspect: 1.0,
            min_boundary: GridVec::new(0, 0, 0),
            max_boundary: GridVec::new(0, 0, 0),
            status: PlannerStatusMsg::default(),
            has_map: false,
            has_goal: false,
            has_start: false,
            goal_updated: false,
            has_hysteresis: false,
            escaping: false,
            publish_stop: false,
            start: Pose2::new(0.0, 0.0, 0.0),
            goal: Pose2::new(0.0, 0.0, 0.0),
            goal_raw: Pose2::new(0.0, 0.0, 0.0),
            cnt_stuck: 0,
            last_costmap: None,
            last_logged_error: PlannerErrorKind::GoingWell,
            jump,
            params,
        })
    }

    pub fn status(&self) -> PlannerStatusMsg {
        self.status
    }

    pub fn is_escaping(&self) -> bool {
        self.escaping
    }

    /// Ingest a full costmap snapshot.
    pub fn handle_map(&mut self, msg: &Costmap3dMsg) -> Result<(), PlannerError> {
        msg.validate()?;

        let info = msg.info;
        info!("Map received");
        info!(
            " linear_resolution {:.2} x ({}x{}) px",
            info.linear_resolution, info.width, info.height
        );
        info!(
            " angular_resolution {:.2} x {} px",
            info.angular_resolution, info.angle
        );

        // Stop robot motion until the next planning step
        self.publish_stop = true;
        self.map_frame = msg.frame_id.clone();
        self.last_costmap = Some(Instant::now());

        self.euclid = EuclidCost::new(
            self.params.max_vel,
            self.params.max_ang_vel,
            self.params.cost.weight_ang_vel,
        );

        let resolution_changed = self
            .map_info
            .map(|mi| {
                mi.linear_resolution != info.linear_resolution
                    || mi.angular_resolution != info.angular_resolution
            })
            .unwrap_or(true);
        self.map_info = Some(info);
        self.conv = Some(GridConverter::new(&info));

        let size = GridVec::new(info.width as i32, info.height as i32, info.angle as i32);
        let angles = size.yaw;

        if resolution_changed {
            self.range = (self.params.search_range / info.linear_resolution).round() as i32;

            self.motion_cache =
                MotionCache::new(info.linear_resolution, info.angular_resolution, self.range);
            self.motion_cache_linear = MotionCache::new_linear(info.linear_resolution, self.range);
            self.rot_cache =
                RotationCache::new(info.linear_resolution, info.angular_resolution, self.range);

            self.search_list.clear();
            self.search_list_rough.clear();
            for dx in -self.range..=self.range {
                for dy in -self.range..=self.range {
                    let d = GridVec::new(dx, dy, 0);
                    if d.sqlen() > self.range * self.range {
                        continue;
                    }
                    for dyaw in 0..angles {
                        self.search_list.push(GridVec::new(dx, dy, dyaw));
                    }
                    self.search_list_rough.push(d);
                }
            }
            debug!(
                "Search list updated (range: ang {}, lin {}) {}",
                angles,
                self.range,
                self.search_list.len()
            );
        }

        // Metric thresholds to grid units
        let lr = info.linear_resolution;
        let ar = info.angular_resolution;
        self.hist_ignore_range = (self.params.remember.hist_ignore_range / lr).round() as i32;
        self.hist_ignore_range_max =
            (self.params.remember.hist_ignore_range_max / lr).round() as i32;
        self.local_range = (self.params.local_range / lr).round() as i32;
        self.longcut_range = (self.params.longcut_range / lr).round() as i32;
        self.esc_range = (self.params.esc_range / lr).round() as i32;
        self.esc_angle = angles / 8;
        self.tolerance_range = (self.params.tolerance_range / lr).round() as i32;
        self.tolerance_angle = (self.params.tolerance_angle / ar).round() as i32;
        self.goal_tolerance_lin = (self.params.goal_tolerance_lin / lr).round() as i32;
        self.goal_tolerance_ang = (self.params.goal_tolerance_ang / ar).round() as i32;
        self.angle_resolution_aspect = 2.0 / ar.tan();

        // Allocate grids
        self.astar.reset(size);
        self.cm = Gridmap::new(size, 0)?;
        self.cm_hyst = Gridmap::new(size, 100)?;
        let rough_size = GridVec::new(size.x, size.y, 1);
        self.cm_rough = Gridmap::new(rough_size, 0)?;
        self.cm_updates = Gridmap::new(rough_size, -1)?;
        self.heuristic.reset(size.x, size.y);
        self.remembered = RememberedMap::new(size.x, size.y);

        // Copy the payload, remapping unknown and collapsing yaw
        let unknown = self.params.unknown_cost.clamp(0, 100) as u8;
        for x in 0..size.x {
            for y in 0..size.y {
                let mut cost_min = 100u8;
                for yaw in 0..angles {
                    let raw = msg.cost_at(x as u32, y as u32, yaw as u32);
                    let c = if raw < 0 { unknown } else { raw as u8 };
                    self.cm[GridVec::new(x, y, yaw)] = c;
                    if c < cost_min {
                        cost_min = c;
                    }
                }
                self.cm_rough[GridVec::new(x, y, 0)] = cost_min;
            }
        }
        debug!("Map copied");

        self.cm_hyst.clear(100);
        self.has_hysteresis = false;
        self.has_map = true;

        self.cm_base = self.cm.clone();
        self.cm_rough_base = self.cm_rough.clone();
        self.remembered.clear();

        self.min_boundary = self.motion_cache.max_range();
        self.max_boundary = GridVec::new(
            size.x - self.min_boundary.x,
            size.y - self.min_boundary.y,
            0,
        );
        info!(
            "x:{}, y:{} grids around the boundary is ignored on path search",
            self.min_boundary.x, self.min_boundary.y
        );

        // The field was reallocated, so the goal must be recomputed against
        // this map before the next plan
        self.goal_updated = false;
        self.update_goal(true);
        Ok(())
    }

    /// Ingest a local costmap update patch.
    pub fn handle_map_update(&mut self, msg: &Costmap3dUpdateMsg) -> Result<(), PlannerError> {
        if !self.has_map {
            return Ok(());
        }
        let info = match self.map_info {
            Some(i) => i,
            None => return Ok(()),
        };
        msg.validate(&info)?;
        debug!("Map updated");
        self.last_costmap = Some(Instant::now());

        self.cm = self.cm_base.clone();
        self.cm_rough = self.cm_rough_base.clone();
        self.cm_updates.clear(-1);

        let angles = info.angle as i32;
        let gp = GridVec::new(msg.x as i32, msg.y as i32, msg.yaw as i32);
        let mut clear_hysteresis = false;

        for px in 0..msg.width as i32 {
            for py in 0..msg.height as i32 {
                let mut cost_min = 100i32;
                for pyaw in 0..msg.angle as i32 {
                    let c = msg.cost_at(px as u32, py as u32, pyaw as u32) as i32;
                    if c < cost_min {
                        cost_min = c;
                    }
                    let pos =
                        GridVec::new(gp.x + px, gp.y + py, gp.yaw + pyaw).cycle_unsigned(angles);
                    if c == 100 && !clear_hysteresis && self.cm_hyst[pos] == 0 {
                        clear_hysteresis = true;
                    }
                }

                let rough_pos = GridVec::new(gp.x + px, gp.y + py, 0);
                self.cm_updates[rough_pos] = cost_min as i8;
                if cost_min > self.cm_rough[rough_pos] as i32 {
                    self.cm_rough[rough_pos] = cost_min as u8;
                }

                for pyaw in 0..msg.angle as i32 {
                    let c = msg.cost_at(px as u32, py as u32, pyaw as u32) as i32;
                    let pos =
                        GridVec::new(gp.x + px, gp.y + py, gp.yaw + pyaw).cycle_unsigned(angles);
                    if self.params.overwrite_cost {
                        if c >= 0 {
                            self.cm[pos] = c as u8;
                        }
                    } else if (self.cm[pos] as i32) < c {
                        self.cm[pos] = c as u8;
                    }
                }
            }
        }

        if clear_hysteresis && self.has_hysteresis {
            info!("The previous path collides to the obstacle. Clearing hysteresis map.");
            self.cm_hyst.clear(100);
            self.has_hysteresis = false;
        }

        if !self.has_start {
            return Ok(());
        }
        let conv = match self.conv {
            Some(c) => c,
            None => return Ok(()),
        };
        let s = conv.metric_to_grid(&self.start);

        if self.params.remember.remember_updates {
            let Self {
                ref mut remembered,
                ref cm_updates,
                ..
            } = *self;
            remembered.remember(
                cm_updates,
                s.rough(),
                self.evidence,
                self.hist_ignore_range,
                self.hist_ignore_range_max,
            );
            remembered.bake();
        }
        if !self.has_goal {
            return Ok(());
        }

        if !self.params.fast_map_update {
            self.update_goal(false);
            return Ok(());
        }

        let e = conv.metric_to_grid(&self.goal);
        if self.cm[e] == 100 {
            // Repair cannot recover a goal that just became lethal
            self.update_goal(false);
            return Ok(());
        }

        let cfg = self.estim_config();
        let Self {
            ref mut heuristic,
            ref pool,
            ref cm_rough,
            ref remembered,
            ref euclid,
            ..
        } = *self;
        heuristic.repair(
            pool,
            (msg.x as i32, msg.y as i32, msg.width as i32, msg.height as i32),
            cm_rough,
            remembered,
            euclid,
            &cfg,
            e.rough(),
            s.rough(),
        );
        Ok(())
    }

    /// Accept (or clear) a goal.
    pub fn set_goal(&mut self, msg: &PoseStamped) -> Result<bool, PlannerError> {
        if msg.frame_id != self.map_frame {
            error!(
                "Goal [{}] pose must be in the map frame [{}].",
                msg.frame_id, self.map_frame
            );
            return Err(PlannerError::FrameMismatch {
                expected: self.map_frame.clone(),
                got: msg.frame_id.clone(),
            });
        }

        self.goal = msg.pose;
        self.goal_raw = msg.pose;

        if msg.pose.is_clear_sentinel() {
            self.has_goal = false;
            return Ok(true);
        }

        self.escaping = false;
        self.has_goal = true;
        self.cnt_stuck = 0;
        if !self.update_goal(true) {
            self.has_goal = false;
            return Ok(false);
        }
        self.status.state = PlannerState::Doing;
        Ok(true)
    }

    /// Drop the active goal.
    pub fn preempt(&mut self) {
        warn!("Preempting the current goal.");
        self.has_goal = false;
        self.status.state = PlannerState::Done;
    }

    /// Clear the remembered obstacle map.
    pub fn forget(&mut self) {
        warn!("Forgetting remembered costmap.");
        if self.has_map {
            self.remembered.clear();
        }
    }

    /// One-shot plan on the rough grid, leaving persistent state untouched.
    pub fn make_plan(&mut self, req: &PlanRequest) -> Result<MetricPathMsg, PlannerError> {
        if !self.has_map {
            return Err(PlannerError::NoMap);
        }
        if req.frame_id != self.map_frame {
            error!(
                "Start and goal poses must be in the map frame [{}].",
                self.map_frame
            );
            return Err(PlannerError::FrameMismatch {
                expected: self.map_frame.clone(),
                got: req.frame_id.clone(),
            });
        }
        let conv = match self.conv {
            Some(c) => c,
            None => return Err(PlannerError::NoMap),
        };

        let s = conv.metric_to_grid(&req.start).rough();
        let e = conv.metric_to_grid(&req.goal).rough();

        if !(self.cm_rough.validate(s, self.range) && self.cm_rough.validate(e, self.range)) {
            error!("Given start or goal is not on the map.");
            return Err(PlannerError::OutsideMap);
        }
        if self.cm_rough[s] == 100 || self.cm_rough[e] == 100 {
            error!("Given start or goal is in Rock.");
            return Err(PlannerError::InRock);
        }

        let ts = Instant::now();
        let time_limit = Duration::from_secs_f32(1.0 / self.params.freq_min);
        let find_best = self.params.find_best;

        let result = {
            let Self {
                ref mut astar,
                ref pool,
                ref cm_rough,
                ref motion_cache_linear,
                ref euclid,
                ref search_list_rough,
                ref params,
                ref map_info,
                ..
            } = *self;
            let model = RoughModel {
                cm_rough,
                motion_cache_linear,
                euclid,
                weight_costmap: params.cost.weight_costmap,
                linear_resolution: map_info.map(|i| i.linear_resolution).unwrap_or(1.0),
                search_list_rough,
            };
            astar.search(
                pool,
                &[VecWithCost::new(s)],
                e,
                &model,
                -1.0,
                time_limit,
                find_best,
            )
        };

        let path = match result {
            SearchResult::Found(p) => p,
            _ => {
                warn!("Path plan failed (goal unreachable)");
                return Err(PlannerError::PathNotFound);
            }
        };
        info!("Path found ({:.4} sec.)", ts.elapsed().as_secs_f64());

        let interp = hysteresis::interpolate_path(&path, 1);
        Ok(MetricPathMsg {
            frame_id: self.map_frame.clone(),
            timestamp: Utc::now(),
            poses: interp.iter().map(|p| conv.grid_f_to_metric(*p)).collect(),
        })
    }

    /// Run one planning cycle.
    pub fn spin_once(&mut self, tf: &dyn TransformProvider) -> CycleOutput {
        let mut output = CycleOutput {
            status: self.status,
            ..Default::default()
        };

        if self.publish_stop {
            output.path = Some(MetricPathMsg::empty(&self.params.robot_frame));
            self.publish_stop = false;
        }

        if self.has_map {
            self.update_start(tf);

            if self.has_start {
                let start = self.start;
                if self.jump.detect(&start) {
                    self.remembered.clear();
                }
            }

            if !self.goal_updated && self.has_goal {
                self.update_goal(true);
            }
        }

        let mut has_costmap = true;
        if self.params.costmap_watchdog > 0.0 {
            let fresh = self
                .last_costmap
                .map(|t| t.elapsed().as_secs_f32() < self.params.costmap_watchdog)
                .unwrap_or(false);
            if !fresh {
                warn!("Navigation is stopping since the costmap is too old");
                self.status.error = PlannerErrorKind::DataMissing;
                output.path = Some(MetricPathMsg::empty(&self.params.robot_frame));
                has_costmap = false;
            }
        }

        if self.has_map && self.has_goal && self.has_start && has_costmap {
            output.feedback = Some(self.start);

            if self.status.state == PlannerState::Finishing {
                let yaw_g = if self.params.force_goal_orientation {
                    self.goal_raw.yaw
                } else {
                    self.goal.yaw
                };
                let yaw_diff = util::maths::wrap_pi(self.start.yaw - yaw_g);
                if yaw_diff.abs() < self.params.goal_tolerance_ang_finish as f64 {
                    self.status.state = PlannerState::Done;
                    self.has_goal = false;
                    // Don't publish an empty path here so the follower can
                    // minimise the error to the final pose
                    info!("Path plan finished");
                }
            } else {
                if self.escaping {
                    self.status.error = PlannerErrorKind::PathNotFound;
                } else if self.params.max_retry_num >= 0
                    && self.cnt_stuck > self.params.max_retry_num
                {
                    self.status.error = PlannerErrorKind::PathNotFound;
                    self.status.state = PlannerState::Done;
                    self.has_goal = false;
                    output.path = Some(MetricPathMsg::empty(&self.params.robot_frame));
                    error!("Exceeded max_retry_num:{}", self.params.max_retry_num);
                    output.status = self.status;
                    return output;
                } else {
                    self.status.error = PlannerErrorKind::GoingWell;
                }

                self.do_plan(&mut output);
                if output.path.is_none() {
                    output.path = Some(MetricPathMsg::empty(&self.params.robot_frame));
                }

                if self.params.sw_wait > 0.0 {
                    if let Some(ref path) = output.path {
                        if hysteresis::switchback_detect(&path.poses) {
                            info!("Planned path has switchback");
                            output.dwell =
                                Some(Duration::from_secs_f32(self.params.sw_wait));
                        }
                    }
                }
            }
        } else if !self.has_goal {
            if !self.params.retain_last_error_status {
                self.status.error = PlannerErrorKind::GoingWell;
            }
            output.path = Some(MetricPathMsg::empty(&self.params.robot_frame));
        }

        if self.status.error != self.last_logged_error {
            if self.status.error.is_error() {
                warn!("Planner status: {}", self.status.error.summary());
            } else {
                info!("Planner status: {}", self.status.error.summary());
            }
            self.last_logged_error = self.status.error;
        }

        output.status = self.status;
        output
    }

    // --------------------------------------------------------------------------------------------
    // DEBUG OUTPUTS
    // --------------------------------------------------------------------------------------------

    /// The heuristic field as a sparse point cloud; z carries the scaled
    /// cost-to-go.
    pub fn distance_field_msg(&self) -> PointCloudMsg {
        let mut points = Vec::new();
        if let Some(conv) = self.conv {
            let size = self.heuristic.size();
            for x in 0..size.x {
                for y in 0..size.y {
                    let p = GridVec::new(x, y, 0);
                    let g = self.heuristic.value(p);
                    if g.is_finite() {
                        let pose = conv.grid_to_metric(p);
                        points.push([pose.x as f32, pose.y as f32, g / 500.0]);
                    }
                }
            }
        }
        PointCloudMsg {
            frame_id: self.map_frame.clone(),
            points,
        }
    }

    /// Min-over-yaw view of the hysteresis map on reachable cells.
    pub fn hysteresis_map_msg(&self) -> OccupancyGridMsg {
        let info = self.map_info.unwrap_or(MapMeta3d {
            width: 0,
            height: 0,
            angle: 1,
            linear_resolution: 1.0,
            angular_resolution: 1.0,
            origin: Pose2::new(0.0, 0.0, 0.0),
        });
        let mut data = vec![100i8; (info.width * info.height) as usize];

        for y in 0..info.height as i32 {
            for x in 0..info.width as i32 {
                let p = GridVec::new(x, y, 0);
                if !self.heuristic.value(p).is_finite() {
                    continue;
                }
                let mut cost = 100u8;
                for yaw in 0..info.angle as i32 {
                    cost = cost.min(self.cm_hyst[GridVec::new(x, y, yaw)]);
                }
                data[(x + y * info.width as i32) as usize] = cost as i8;
            }
        }

        OccupancyGridMsg {
            frame_id: self.map_frame.clone(),
            resolution: info.linear_resolution,
            width: info.width,
            height: info.height,
            origin: info.origin,
            data,
        }
    }

    /// The remembered map as probabilities scaled to [0, 100].
    pub fn remembered_map_msg(&self) -> OccupancyGridMsg {
        let info = self.map_info.unwrap_or(MapMeta3d {
            width: 0,
            height: 0,
            angle: 1,
            linear_resolution: 1.0,
            angular_resolution: 1.0,
            origin: Pose2::new(0.0, 0.0, 0.0),
        });
        let mut data = vec![0i8; (info.width * info.height) as usize];

        for y in 0..info.height as i32 {
            for x in 0..info.width as i32 {
                let p = GridVec::new(x, y, 0);
                data[(x + y * info.width as i32) as usize] =
                    (self.remembered.normalized(p) * 100.0).round() as i8;
            }
        }

        OccupancyGridMsg {
            frame_id: self.map_frame.clone(),
            resolution: info.linear_resolution,
            width: info.width,
            height: info.height,
            origin: info.origin,
            data,
        }
    }

    // --------------------------------------------------------------------------------------------
    // INTERNALS
    // --------------------------------------------------------------------------------------------

    fn estim_config(&self) -> EstimConfig {
        EstimConfig {
            linear_resolution: self
                .map_info
                .map(|i| i.linear_resolution)
                .unwrap_or(1.0),
            weight_costmap: self.params.cost.weight_costmap,
            weight_remembered: self.params.cost.weight_remembered,
            range: self.range,
            local_range: self.local_range,
            longcut_range: self.longcut_range,
            num_tasks: self.params.cost_estim_task_num(),
        }
    }

    fn update_start(&mut self, tf: &dyn TransformProvider) {
        match tf.lookup(&self.map_frame, &self.params.robot_frame) {
            Ok(pose) => {
                self.start = pose;
                self.has_start = true;
            }
            Err(_) => {
                self.has_start = false;
            }
        }
    }

    /// Validate the goal against the current map and rebuild the heuristic
    /// field. Returns false when the goal cannot be used at all.
    fn update_goal(&mut self, goal_changed: bool) -> bool {
        if !self.has_goal {
            return true;
        }
        if !self.has_map || !self.has_start {
            error!(
                "Goal received, however map/goal/start are not ready. ({}/{}/{})",
                self.has_map as u8, self.has_goal as u8, self.has_start as u8
            );
            return true;
        }
        let conv = match self.conv {
            Some(c) => c,
            None => return true,
        };

        let mut s = conv.metric_to_grid(&self.start);
        let mut e = conv.metric_to_grid(&self.goal);
        if goal_changed {
            info!("New goal received ({}, {}, {})", e.x, e.y, e.yaw);
        }

        if !self.cm.validate(e, self.range) {
            error!("Given goal is not on the map.");
            return false;
        }
        if !self.cm.validate(s, self.range) {
            error!("You are on the edge of the world.");
            return false;
        }

        let ts = Instant::now();

        if self.cm[e] == 100 {
            match self.search_available_pos(e, self.tolerance_range, self.tolerance_angle, 50, 0) {
                Some(moved) => {
                    e = moved;
                    info!("Goal moved ({}, {}, {})", e.x, e.y, e.yaw);
                    self.goal = conv.grid_to_metric(e);
                }
                None => {
                    warn!("Oops! Goal is in Rock!");
                    self.cnt_stuck += 1;
                    return true;
                }
            }
        }
        if self.cm[s] == 100 {
            match self.search_available_pos(s, self.tolerance_range, self.tolerance_angle, 50, 0) {
                Some(moved) => s = moved,
                None => {
                    warn!("Oops! You are in Rock!");
                    return true;
                }
            }
        }

        let cfg = self.estim_config();
        let Self {
            ref mut heuristic,
            ref pool,
            ref cm_rough,
            ref remembered,
            ref euclid,
            ..
        } = *self;
        heuristic.rebuild(pool, cm_rough, remembered, euclid, &cfg, e.rough(), s.rough());
        debug!(
            "Cost estimation cache generated ({:.4} sec.)",
            ts.elapsed().as_secs_f64()
        );

        if goal_changed {
            self.cm_hyst.clear(100);
            self.has_hysteresis = false;
        }

        self.goal_updated = true;
        true
    }

    /// Spiral-scan for the cheapest non-lethal pose around `s`. The first
    /// pass only accepts cells below `cost_acceptable`; if nothing
    /// qualifies, a second pass accepts anything non-lethal.
    fn search_available_pos(
        &self,
        s: GridVec,
        xy_range: i32,
        angle_range: i32,
        cost_acceptable: u8,
        min_xy_range: i32,
    ) -> Option<GridVec> {
        let info = self.map_info?;
        let angles = info.angle as i32;

        let mut acceptable = cost_acceptable;
        loop {
            let mut range_min = f32::INFINITY;
            let mut s_out = s;

            for dyaw in -angle_range..=angle_range {
                for dx in -xy_range..=xy_range {
                    for dy in -xy_range..=xy_range {
                        let d = GridVec::new(dx, dy, dyaw);
                        if dx == 0 && dy == 0 && dyaw == 0 {
                            continue;
                        }
                        if d.sqlen() > xy_range * xy_range {
                            continue;
                        }
                        if d.sqlen() < min_xy_range * min_xy_range {
                            continue;
                        }

                        let s2 = (s + d).cycle_unsigned(angles);
                        if !self.cm.validate(s2, self.range) {
                            continue;
                        }
                        if self.cm[s2] >= acceptable {
                            continue;
                        }

                        let cost = self.euclid.full(d, angles);
                        if cost < range_min {
                            range_min = cost;
                            s_out = s2;
                        }
                    }
                }
            }

            if range_min.is_finite() {
                return Some(s_out);
            }
            if acceptable == 100 {
                return None;
            }
            acceptable = 100;
        }
    }

    /// The live planning pass: start seeding, search, hysteresis rebuild.
    fn do_plan(&mut self, output: &mut CycleOutput) {
        let conv = match self.conv {
            Some(c) => c,
            None => return,
        };
        let angles = conv.angles();
        let lr = match self.map_info {
            Some(i) => i.linear_resolution,
            None => return,
        };

        let e = conv.metric_to_grid(&self.goal);
        let sf = conv.metric_to_grid_f(&self.start);
        let mut s = sf.round().cycle_unsigned(angles);
        if !self.cm.validate(s, self.range) {
            error!("You are on the edge of the world.");
            return;
        }

        // Seed the starts, antialiasing against the sub-cell start position
        let mut starts: Vec<VecWithCost> = Vec::new();
        if self.params.antialias_start {
            let x_cand = [0, if sf.x - (s.x as f32) < 0.0 { -1 } else { 1 }];
            let y_cand = [0, if sf.y - (s.y as f32) < 0.0 { -1 } else { 1 }];
            for &dx in &x_cand {
                for &dy in &y_cand {
                    let p = (s + GridVec::new(dx, dy, 0)).cycle_unsigned(angles);
                    if !self.cm.validate(p, self.range) {
                        continue;
                    }
                    let subpx = GridVecF::new(sf.x - p.x as f32, sf.y - p.y as f32, 0.0);
                    if subpx.sqlen() > 1.0 {
                        continue;
                    }
                    if self.cm[p] > 99 {
                        continue;
                    }
                    starts.push(VecWithCost::new(p));
                }
            }
        } else if self.cm[s] < 100 {
            starts.push(VecWithCost::new(s));
        }

        for st in &mut starts {
            st.c = ((st.v.x as f32 - sf.x) * self.euclid.lin)
                .hypot((st.v.y as f32 - sf.y) * self.euclid.lin);
            st.c += self.cm[st.v] as f32 * self.params.cost.weight_costmap / 100.0;

            // Already within the goal tolerance?
            let remain = (st.v - e).cycle_signed(angles);
            if remain.sqlen() <= self.goal_tolerance_lin * self.goal_tolerance_lin
                && remain.yaw.abs() <= self.goal_tolerance_ang
            {
                let pose = if self.params.force_goal_orientation {
                    self.goal_raw
                } else {
                    self.goal
                };
                output.path = Some(MetricPathMsg {
                    frame_id: self.map_frame.clone(),
                    timestamp: Utc::now(),
                    poses: vec![pose],
                });

                if self.escaping {
                    self.goal = self.goal_raw;
                    self.escaping = false;
                    self.update_goal(true);
                    info!("Escaped");
                } else {
                    self.status.state = PlannerState::Finishing;
                    info!("Path plan finishing");
                }
                return;
            }
        }

        output.end_pose = Some(PoseStamped::new(&self.map_frame, conv.grid_to_metric(e)));

        if starts.is_empty() {
            match self.search_available_pos(s, self.tolerance_range, self.tolerance_angle, 50, 0) {
                Some(moved) => {
                    info!("Start moved");
                    s = moved;
                    starts.push(VecWithCost::new(s));
                }
                None => {
                    warn!("Oops! You are in Rock!");
                    self.status.error = PlannerErrorKind::InRock;
                    self.status.state = PlannerState::Done;
                    self.has_goal = false;
                    return;
                }
            }
        }

        let s_rough = s.rough();
        if self.heuristic.value(s_rough).is_infinite() {
            self.status.error = PlannerErrorKind::PathNotFound;
            self.cnt_stuck += 1;
            warn!("Goal unreachable.");

            if !self.escaping && self.params.temporary_escape {
                if let Some(esc) = self.search_available_pos(
                    s,
                    self.esc_range,
                    self.esc_angle,
                    50,
                    self.esc_range / 2,
                ) {
                    self.escaping = true;
                    info!("Temporary goal ({}, {}, {})", esc.x, esc.y, esc.yaw);
                    self.goal = conv.grid_to_metric(esc);
                    self.update_goal(true);
                }
            }
            return;
        }

        output.start_pose = Some(PoseStamped::new(&self.map_frame, conv.grid_to_metric(s)));

        let range_limit = self.heuristic.value(s_rough)
            - (self.local_range + self.range) as f32 * self.euclid.lin;
        let time_limit = Duration::from_secs_f32(1.0 / self.params.freq_min);

        let ts = Instant::now();
        let result = {
            let Self {
                ref mut astar,
                ref pool,
                ref cm,
                ref cm_hyst,
                ref heuristic,
                ref motion_cache,
                ref rot_cache,
                ref euclid,
                ref search_list,
                ref search_list_rough,
                ref params,
                ..
            } = *self;
            let model = KinematicModel {
                cm,
                cm_hyst,
                use_hysteresis: self.has_hysteresis,
                heuristic,
                motion_cache,
                rot_cache,
                euclid,
                coeff: &params.cost,
                search_list,
                search_list_rough,
                start_cells: starts.iter().map(|st| st.v).collect(),
                linear_resolution: lr,
                angular_resolution: self
                    .map_info
                    .map(|i| i.angular_resolution)
                    .unwrap_or(1.0),
                angles,
                local_range: self.local_range,
                min_curve_radius: self.params.min_curve_radius,
                max_vel: self.params.max_vel,
                max_ang_vel: self.params.max_ang_vel,
                angle_resolution_aspect: self.angle_resolution_aspect,
                min_boundary: self.min_boundary,
                max_boundary: self.max_boundary,
                goal_tolerance_lin: self.goal_tolerance_lin,
                goal_tolerance_ang: self.goal_tolerance_ang,
            };
            astar.search(pool, &starts, e, &model, range_limit, time_limit, true)
        };

        let path = match result {
            SearchResult::Found(p) => p,
            SearchResult::Best(p) => {
                warn!("Path plan failed (goal unreachable)");
                self.status.error = PlannerErrorKind::PathNotFound;
                self.cnt_stuck += 1;
                if !self.params.find_best {
                    return;
                }
                p
            }
            SearchResult::NotFound => {
                warn!("Path plan failed (goal unreachable)");
                self.status.error = PlannerErrorKind::PathNotFound;
                self.cnt_stuck += 1;
                return;
            }
        };
        debug!("Path found ({:.4} sec.)", ts.elapsed().as_secs_f64());

        let interp = hysteresis::interpolate_path(&path, angles);
        output.path = Some(MetricPathMsg {
            frame_id: self.map_frame.clone(),
            timestamp: Utc::now(),
            poses: interp.iter().map(|p| conv.grid_f_to_metric(*p)).collect(),
        });

        // Rebuild the hysteresis bias around the new path
        let ts = Instant::now();
        let max_dist = self.params.cost.hysteresis_max_dist / lr;
        let expand = self.params.cost.hysteresis_expand / lr;
        hysteresis::build(
            &mut self.cm_hyst,
            &interp,
            self.range,
            max_dist,
            expand,
            angles,
        );
        self.has_hysteresis = true;
        debug!(
            "Hysteresis map generated ({:.4} sec.)",
            ts.elapsed().as_secs_f64()
        );
    }
}
