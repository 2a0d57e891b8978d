//! # Planned path and debug grid messages

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pose::Pose2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A metric path through the map frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPathMsg {
    pub frame_id: String,

    /// UTC timestamp at which the path was planned
    pub timestamp: DateTime<Utc>,

    pub poses: Vec<Pose2>,
}

/// One-shot plan request (the `make_plan` RPC body).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub frame_id: String,
    pub start: Pose2,
    pub goal: Pose2,
}

/// A 2-D occupancy-style debug grid (hysteresis and remembered maps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyGridMsg {
    pub frame_id: String,
    pub resolution: f32,
    pub width: u32,
    pub height: u32,
    pub origin: Pose2,

    /// Row-major (y, x) values in [0, 100], -1 for unknown
    pub data: Vec<i8>,
}

/// Sparse point cloud rendering of the heuristic distance field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudMsg {
    pub frame_id: String,

    /// (x, y, z) triples; z carries the scaled cost-to-go value
    pub points: Vec<[f32; 3]>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MetricPathMsg {
    /// An empty path, published to stop the follower.
    pub fn empty(frame_id: &str) -> Self {
        Self {
            frame_id: frame_id.to_owned(),
            timestamp: Utc::now(),
            poses: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
