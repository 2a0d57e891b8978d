//! # SE(2) pose types
//!
//! The planner works in a planar world, so poses are (x, y, yaw) in the map
//! frame rather than full 3-D transforms.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A planar pose: position in meters and heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// A [`Pose2`] tagged with the frame it is expressed in and an acquisition time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseStamped {
    /// The frame the pose is expressed in
    pub frame_id: String,

    /// UTC timestamp of the pose
    pub timestamp: DateTime<Utc>,

    pub pose: Pose2,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose2 {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    /// A goal pose with a non-finite yaw is the upstream convention for
    /// "clear the current goal".
    pub fn is_clear_sentinel(&self) -> bool {
        !self.yaw.is_finite()
    }
}

impl PoseStamped {
    pub fn new(frame_id: &str, pose: Pose2) -> Self {
        Self {
            frame_id: frame_id.to_owned(),
            timestamp: Utc::now(),
            pose,
        }
    }
}
