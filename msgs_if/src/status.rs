//! # Planner status record

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Lifecycle state of the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannerState {
    /// No active goal (also the terminal state of a finished goal)
    Done,

    /// Actively planning towards the goal
    Doing,

    /// Position reached, converging the final yaw
    Finishing,
}

/// Error tag accompanying the planner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannerErrorKind {
    GoingWell,
    InRock,
    PathNotFound,
    DataMissing,
    InternalError,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The status record published after every planner cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerStatusMsg {
    pub state: PlannerState,
    pub error: PlannerErrorKind,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlannerErrorKind {
    /// Human readable summary, used for diagnostics output.
    pub fn summary(&self) -> &'static str {
        match self {
            PlannerErrorKind::GoingWell => "Going well.",
            PlannerErrorKind::InRock => "The robot is in rock.",
            PlannerErrorKind::PathNotFound => "Path not found.",
            PlannerErrorKind::DataMissing => "Required data is missing.",
            PlannerErrorKind::InternalError => "Planner internal error.",
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, PlannerErrorKind::GoingWell)
    }
}

impl Default for PlannerStatusMsg {
    fn default() -> Self {
        Self {
            state: PlannerState::Done,
            error: PlannerErrorKind::GoingWell,
        }
    }
}
