//! # Pose jump detector
//!
//! Watches the robot pose between planning cycles. A jump larger than the
//! configured thresholds means the localisation was re-initialised, so
//! accumulated obstacle memory no longer lines up with the world and must be
//! dropped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use msgs_if::pose::Pose2;
use util::maths::wrap_pi;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JumpDetector {
    pos_jump: f64,
    yaw_jump: f64,
    last: Option<Pose2>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JumpDetector {
    pub fn new(pos_jump: f64, yaw_jump: f64) -> Self {
        Self {
            pos_jump,
            yaw_jump,
            last: None,
        }
    }

    /// Feed the current pose; returns true if it jumped since the last call.
    pub fn detect(&mut self, pose: &Pose2) -> bool {
        let jumped = match self.last {
            Some(last) => {
                let dist = ((pose.x - last.x).powi(2) + (pose.y - last.y).powi(2)).sqrt();
                let dyaw = wrap_pi(pose.yaw - last.yaw).abs();
                dist > self.pos_jump || dyaw > self.yaw_jump
            }
            None => false,
        };
        self.last = Some(*pose);
        jumped
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_detect() {
        let mut jump = JumpDetector::new(1.0, 1.5);

        assert!(!jump.detect(&Pose2::new(0.0, 0.0, 0.0)));
        assert!(!jump.detect(&Pose2::new(0.5, 0.0, 0.1)));
        assert!(jump.detect(&Pose2::new(3.0, 0.0, 0.1)));
        // Back to small motion after the jump
        assert!(!jump.detect(&Pose2::new(3.1, 0.0, 0.1)));
        // Yaw-only jump
        assert!(jump.detect(&Pose2::new(3.1, 0.0, 2.0)));
    }
}
