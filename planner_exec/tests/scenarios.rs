//! End-to-end planner scenarios: full costmap ingest, goal lifecycle and
//! plan cycles through the public node interface.

use std::f64::consts::PI;

use msgs_if::costmap::{Costmap3dMsg, Costmap3dUpdateMsg, MapMeta3d};
use msgs_if::pose::{Pose2, PoseStamped};
use msgs_if::status::{PlannerErrorKind, PlannerState};
use msgs_if::tf::{TransformError, TransformProvider};
use planner_lib::{Planner3d, PlannerParams};

const LIN_RES: f32 = 0.1;
const ANGLES: u32 = 16;

// ------------------------------------------------------------------------------------------------
// HELPERS
// ------------------------------------------------------------------------------------------------

struct FixedTf(Pose2);

impl TransformProvider for FixedTf {
    fn lookup(&self, _map_frame: &str, _robot_frame: &str) -> Result<Pose2, TransformError> {
        Ok(self.0)
    }
}

fn meta(width: u32, height: u32) -> MapMeta3d {
    MapMeta3d {
        width,
        height,
        angle: ANGLES,
        linear_resolution: LIN_RES,
        angular_resolution: std::f32::consts::PI * 2.0 / ANGLES as f32,
        origin: Pose2::new(0.0, 0.0, 0.0),
    }
}

/// Build a full costmap message; `lethal` decides per (x, y) cell, applied
/// to every yaw bucket.
fn costmap_msg(width: u32, height: u32, lethal: impl Fn(i32, i32) -> bool) -> Costmap3dMsg {
    let info = meta(width, height);
    let mut data = vec![0i8; (width * height * ANGLES) as usize];
    for yaw in 0..ANGLES {
        for y in 0..height {
            for x in 0..width {
                if lethal(x as i32, y as i32) {
                    let addr = ((yaw * height + y) * width + x) as usize;
                    data[addr] = 100;
                }
            }
        }
    }
    Costmap3dMsg {
        frame_id: "map".into(),
        timestamp: chrono::Utc::now(),
        info,
        data,
    }
}

/// A local update patch; `cost` decides per patch-relative (x, y) cell.
fn update_msg(
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    cost: impl Fn(i32, i32) -> i8,
) -> Costmap3dUpdateMsg {
    let mut data = vec![0i8; (width * height * ANGLES) as usize];
    for yaw in 0..ANGLES {
        for py in 0..height {
            for px in 0..width {
                let addr = ((yaw * height + py) * width + px) as usize;
                data[addr] = cost(px as i32, py as i32);
            }
        }
    }
    Costmap3dUpdateMsg {
        x,
        y,
        yaw: 0,
        width,
        height,
        angle: ANGLES,
        data,
    }
}

fn test_params() -> PlannerParams {
    let mut params = PlannerParams::default();
    params.num_threads = 2;
    params.freq_min = 0.5;
    params.sw_wait = 0.0;
    params.map_frame = "map".into();
    params
}

fn cell_pose(x: i32, y: i32, yaw: f64) -> Pose2 {
    Pose2::new(
        (x as f64 + 0.5) * LIN_RES as f64,
        (y as f64 + 0.5) * LIN_RES as f64,
        yaw,
    )
}

fn pose_cell(pose: &Pose2) -> (i32, i32) {
    (
        (pose.x / LIN_RES as f64 - 0.5).round() as i32,
        (pose.y / LIN_RES as f64 - 0.5).round() as i32,
    )
}

fn grid_value(msg: &msgs_if::plan::OccupancyGridMsg, x: i32, y: i32) -> i8 {
    msg.data[(x + y * msg.width as i32) as usize]
}

// ------------------------------------------------------------------------------------------------
// SCENARIOS
// ------------------------------------------------------------------------------------------------

#[test]
fn straight_corridor() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    // Free corridor with a lethal bottom row and a partial top wall
    let map = costmap_msg(32, 11, |x, y| y == 0 || (y == 10 && x >= 18));
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    planner
        .set_goal(&PoseStamped::new("map", cell_pose(10, 5, PI)))
        .unwrap();
    assert_eq!(planner.status().state, PlannerState::Doing);

    let output = planner.spin_once(&tf);
    assert_eq!(output.status.error, PlannerErrorKind::GoingWell);

    let path = output.path.expect("a path should be published");
    assert!(!path.poses.is_empty());

    // The path ends within the goal tolerance
    let (ex, ey) = pose_cell(path.poses.last().unwrap());
    assert!((ex - 10).abs() <= 1 && (ey - 5).abs() <= 1);

    // Every pose stays off the lethal rows
    for p in &path.poses {
        let (_, y) = pose_cell(p);
        assert!(y >= 1 && y <= 9);
    }

    // Hysteresis is zero along the planned path and saturated away from it
    let hyst = planner.hysteresis_map_msg();
    let (mx, my) = pose_cell(&path.poses[path.poses.len() / 2]);
    assert_eq!(grid_value(&hyst, mx, my), 0);
    assert_eq!(grid_value(&hyst, 15, 2), 100);
}

#[test]
fn remembered_obstacles_accumulate() {
    let mut params = test_params();
    params.remember.remember_updates = true;
    let mut planner = Planner3d::new(params).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    let map = costmap_msg(32, 11, |_, y| y == 0);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    // An update patch reporting a wall segment at x = 17
    let patch = update_msg(12, 0, 10, 11, |px, py| {
        if px == 5 && (py == 9 || py == 10) {
            100
        } else {
            0
        }
    });
    planner.handle_map_update(&patch).unwrap();

    let remembered = planner.remembered_map_msg();
    // Hit evidence inside the annulus raised the belief
    assert!(grid_value(&remembered, 17, 9) > 0);
    // Observed-free cells inside the annulus stay at the floor
    assert_eq!(grid_value(&remembered, 17, 5), 0);
    // The robot's own footprint receives no evidence
    assert_eq!(grid_value(&remembered, 24, 5), 0);
}

#[test]
fn goal_in_rock_is_moved() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    // Only the goal cell itself is lethal
    let map = costmap_msg(32, 11, |x, y| y == 0 || (x == 10 && y == 5));
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    let accepted = planner
        .set_goal(&PoseStamped::new("map", cell_pose(10, 5, PI)))
        .unwrap();
    assert!(accepted);

    let output = planner.spin_once(&tf);
    assert_eq!(output.status.error, PlannerErrorKind::GoingWell);

    let path = output.path.expect("a path should be published");
    assert!(!path.poses.is_empty());
    // The relocated goal is near, but not on, the lethal cell
    let (ex, ey) = pose_cell(path.poses.last().unwrap());
    assert!((ex - 10).abs() <= 4 && (ey - 5).abs() <= 4);
    assert!(!(ex == 10 && ey == 5));
}

#[test]
fn start_in_rock_aborts() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    // The start and everything within the relocation tolerance is lethal
    let map = costmap_msg(32, 11, |x, y| {
        y == 0 || ((21..=29).contains(&x) && (1..=9).contains(&y))
    });
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    planner
        .set_goal(&PoseStamped::new("map", cell_pose(10, 5, PI)))
        .unwrap();

    let output = planner.spin_once(&tf);
    assert_eq!(output.status.error, PlannerErrorKind::InRock);
    assert_eq!(output.status.state, PlannerState::Done);
    assert!(output.path.expect("empty path published").is_empty());
}

#[test]
fn unreachable_goal_escapes() {
    let mut params = test_params();
    params.temporary_escape = true;
    let mut planner = Planner3d::new(params).unwrap();
    let tf = FixedTf(cell_pose(25, 10, PI));

    // A full-height wall separates the robot from the goal
    let map = costmap_msg(32, 21, |x, _| x == 15);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    planner
        .set_goal(&PoseStamped::new("map", cell_pose(5, 10, PI)))
        .unwrap();

    let output = planner.spin_once(&tf);
    assert_eq!(output.status.error, PlannerErrorKind::PathNotFound);
    assert!(planner.is_escaping());

    // The next cycle plans towards (or arrives at) the temporary goal
    let output = planner.spin_once(&tf);
    assert!(!output.path.expect("a path should be published").is_empty());
}

#[test]
fn incremental_repair_detours() {
    let mut params = test_params();
    params.fast_map_update = true;
    let mut planner = Planner3d::new(params).unwrap();
    let tf = FixedTf(cell_pose(25, 10, PI));

    let map = costmap_msg(32, 21, |_, _| false);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    planner
        .set_goal(&PoseStamped::new("map", cell_pose(5, 10, PI)))
        .unwrap();

    let output = planner.spin_once(&tf);
    let baseline = output.path.expect("baseline path");
    assert!(!baseline.is_empty());

    // Drop a lethal block across the old path, 8 cells ahead of the robot
    let patch = update_msg(12, 6, 10, 9, |px, py| {
        if (3..8).contains(&px) && (2..7).contains(&py) {
            100
        } else {
            0
        }
    });
    planner.handle_map_update(&patch).unwrap();

    let output = planner.spin_once(&tf);
    assert_eq!(output.status.error, PlannerErrorKind::GoingWell);
    let detour = output.path.expect("detour path");
    assert!(!detour.is_empty());

    // The new path avoids the interior of the blocked rectangle
    // (x 15..20, y 8..13); a one-cell rim is left for rounding of the
    // interpolated poses
    for p in &detour.poses {
        let (x, y) = pose_cell(p);
        assert!(
            !((16..19).contains(&x) && (9..12).contains(&y)),
            "pose ({}, {}) crosses the new obstacle",
            x,
            y
        );
    }
}

#[test]
fn finishing_then_done() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    // Robot one cell from the goal, already facing the goal yaw
    let tf = FixedTf(cell_pose(11, 5, PI));

    let map = costmap_msg(32, 11, |_, y| y == 0);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    planner
        .set_goal(&PoseStamped::new("map", cell_pose(10, 5, PI)))
        .unwrap();

    // Within the goal tolerance: a single-pose path and FINISHING
    let output = planner.spin_once(&tf);
    let path = output.path.expect("single-pose path");
    assert_eq!(path.poses.len(), 1);
    assert_eq!(output.status.state, PlannerState::Finishing);

    // Yaw already converged: the next cycle completes the goal
    let output = planner.spin_once(&tf);
    assert_eq!(output.status.state, PlannerState::Done);
}

#[test]
fn preempt_clears_goal() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    let map = costmap_msg(32, 11, |_, y| y == 0);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    planner
        .set_goal(&PoseStamped::new("map", cell_pose(10, 5, PI)))
        .unwrap();
    assert_eq!(planner.status().state, PlannerState::Doing);

    planner.preempt();
    assert_eq!(planner.status().state, PlannerState::Done);

    // Idle cycles publish empty paths
    let output = planner.spin_once(&tf);
    assert!(output.path.expect("empty path").is_empty());
}

#[test]
fn goal_frame_mismatch_rejected() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    let map = costmap_msg(32, 11, |_, y| y == 0);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    let goal = PoseStamped::new("odom", cell_pose(10, 5, PI));
    assert!(planner.set_goal(&goal).is_err());
}

#[test]
fn make_plan_is_stateless() {
    let mut planner = Planner3d::new(test_params()).unwrap();
    let tf = FixedTf(cell_pose(25, 5, PI));

    let map = costmap_msg(32, 11, |_, y| y == 0);
    planner.handle_map(&map).unwrap();
    planner.spin_once(&tf);

    let req = msgs_if::plan::PlanRequest {
        frame_id: "map".into(),
        start: cell_pose(25, 5, PI),
        goal: cell_pose(10, 5, 0.0),
    };
    let path = planner.make_plan(&req).unwrap();
    assert!(!path.poses.is_empty());
    let (ex, ey) = pose_cell(path.poses.last().unwrap());
    assert_eq!((ex, ey), (10, 5));

    // No goal was adopted
    assert_eq!(planner.status().state, PlannerState::Done);
}
