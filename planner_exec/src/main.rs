//! Planner executable entry point.
//!
//! Wires the planner to its inputs through mpsc channels. Transport of the
//! messages themselves (network, IPC) is out of scope here; a deployment
//! keeps the senders and feeds them from its own stack.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::eyre::{eyre, Result};
use log::{info, warn};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::time::Duration;

// Internal
use msgs_if::costmap::{Costmap3dMsg, Costmap3dUpdateMsg};
use msgs_if::plan::PlanRequest;
use msgs_if::pose::{Pose2, PoseStamped};
use msgs_if::tf::{TransformError, TransformProvider};
use planner_lib::{Planner3d, PlannerParams};
use util::logger::{logger_init, LevelFilter};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Inbound message channels of the node.
struct NodeChannels {
    map_rx: Receiver<Costmap3dMsg>,
    map_update_rx: Receiver<Costmap3dUpdateMsg>,
    goal_rx: Receiver<PoseStamped>,
    plan_rx: Receiver<PlanRequest>,
}

/// Sender halves, handed to whatever transport feeds the node.
#[allow(dead_code)]
struct NodeSenders {
    map_tx: Sender<Costmap3dMsg>,
    map_update_tx: Sender<Costmap3dUpdateMsg>,
    goal_tx: Sender<PoseStamped>,
    plan_tx: Sender<PlanRequest>,
}

/// Placeholder transform source until a localisation stack is attached.
struct StaticTransform(Pose2);

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl TransformProvider for StaticTransform {
    fn lookup(&self, _map_frame: &str, _robot_frame: &str) -> Result<Pose2, TransformError> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<()> {
    color_eyre::install()?;

    // Initialise logger
    logger_init(LevelFilter::Debug, "planner_exec.log")
        .map_err(|e| eyre!("Error initialising logging: {:?}", e))?;

    // Load parameters, falling back to defaults when no file is given
    let params = match std::env::args().nth(1) {
        Some(path) => util::params::load::<PlannerParams>(&path)
            .map_err(|e| eyre!("Cannot load parameters: {}", e))?,
        None => {
            warn!("No parameter file given, using defaults");
            PlannerParams::default()
        }
    };

    let cycle = Duration::from_secs_f32(1.0 / params.freq);
    let mut planner = Planner3d::new(params)?;

    let (map_tx, map_rx) = channel();
    let (map_update_tx, map_update_rx) = channel();
    let (goal_tx, goal_rx) = channel();
    let (plan_tx, plan_rx) = channel();
    let channels = NodeChannels {
        map_rx,
        map_update_rx,
        goal_rx,
        plan_rx,
    };
    let _senders = NodeSenders {
        map_tx,
        map_update_tx,
        goal_tx,
        plan_tx,
    };

    let tf = StaticTransform(Pose2::new(0.0, 0.0, 0.0));

    info!("Planner initialised, entering plan loop");
    loop {
        std::thread::sleep(cycle);

        // Drain inbound messages
        loop {
            match channels.map_rx.try_recv() {
                Ok(msg) => {
                    if let Err(e) = planner.handle_map(&msg) {
                        warn!("Rejected costmap: {}", e);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        while let Ok(msg) = channels.map_update_rx.try_recv() {
            if let Err(e) = planner.handle_map_update(&msg) {
                warn!("Rejected costmap update: {}", e);
            }
        }
        while let Ok(msg) = channels.goal_rx.try_recv() {
            if let Err(e) = planner.set_goal(&msg) {
                warn!("Rejected goal: {}", e);
            }
        }
        while let Ok(req) = channels.plan_rx.try_recv() {
            match planner.make_plan(&req) {
                Ok(path) => info!("make_plan produced {} poses", path.poses.len()),
                Err(e) => warn!("make_plan failed: {}", e),
            }
        }

        let output = planner.spin_once(&tf);

        if let Some(dwell) = output.dwell {
            std::thread::sleep(dwell);
        }
    }
}
