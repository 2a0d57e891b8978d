//! # Planner interface crate.
//!
//! Provides the message schema shared between the planner and its external
//! collaborators: costmaps, poses, plans, status records and the transform
//! provider seam. Transport of these messages is not this crate's concern.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Costmap and costmap update messages
pub mod costmap;

/// SE(2) pose types
pub mod pose;

/// Planned path and debug grid messages
pub mod plan;

/// Planner status record
pub mod status;

/// Transform provider seam
pub mod tf;
