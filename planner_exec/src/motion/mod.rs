//! # Motion primitive caches
//!
//! Non-holonomic motion primitives (straight segments, in-place turns and
//! circular arcs) are precomputed once per map resolution change and shared
//! immutably across all searches. The rotation cache holds per-primitive
//! motion vectors and turn radii; the motion cache holds the swept cells and
//! arc lengths used for collision testing and cost integration.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod cache;
pub mod rotation;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use cache::{line_sweep, MotionCache, MotionPage};
pub use rotation::RotationCache;
