//! # Transform provider seam
//!
//! The planner queries the robot pose through this trait rather than a
//! transform tree of its own. Implementations are expected to answer within
//! a short timeout; a failed lookup simply skips the planning cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::pose::Pose2;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("No transform available from {from} to {to}")]
    NotAvailable { from: String, to: String },

    #[error("Transform lookup timed out after {timeout_s} s")]
    Timeout { timeout_s: f64 },
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Source of the (map frame -> robot frame) transform.
pub trait TransformProvider {
    /// Pose of `robot_frame` expressed in `map_frame`.
    fn lookup(&self, map_frame: &str, robot_frame: &str) -> Result<Pose2, TransformError>;
}
