//! # Grid / metric conversion
//!
//! Converts between metric map-frame poses and grid coordinates for one map
//! discretisation. Cell centres sit at half-cell offsets from the origin;
//! the yaw bucket width is the map's angular resolution.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use msgs_if::costmap::MapMeta3d;
use msgs_if::pose::Pose2;

use crate::grid::{GridVec, GridVecF};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct GridConverter {
    origin: Pose2,
    linear_resolution: f32,
    angular_resolution: f32,
    angles: i32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GridConverter {
    pub fn new(info: &MapMeta3d) -> Self {
        Self {
            origin: info.origin,
            linear_resolution: info.linear_resolution,
            angular_resolution: info.angular_resolution,
            angles: info.angle as i32,
        }
    }

    pub fn angles(&self) -> i32 {
        self.angles
    }

    /// Fractional grid coordinate of a metric pose. The integer part of the
    /// planar components addresses the cell whose centre is nearest.
    pub fn metric_to_grid_f(&self, pose: &Pose2) -> GridVecF {
        GridVecF::new(
            ((pose.x - self.origin.x) as f32 / self.linear_resolution) - 0.5,
            ((pose.y - self.origin.y) as f32 / self.linear_resolution) - 0.5,
            util::maths::wrap_pi(pose.yaw) as f32 / self.angular_resolution,
        )
    }

    /// Nearest grid coordinate of a metric pose, yaw wrapped into range.
    pub fn metric_to_grid(&self, pose: &Pose2) -> GridVec {
        self.metric_to_grid_f(pose).round().cycle_unsigned(self.angles)
    }

    /// Metric pose of a grid cell centre.
    pub fn grid_to_metric(&self, p: GridVec) -> Pose2 {
        let p = p.cycle_unsigned(self.angles);
        Pose2::new(
            self.origin.x + ((p.x as f32 + 0.5) * self.linear_resolution) as f64,
            self.origin.y + ((p.y as f32 + 0.5) * self.linear_resolution) as f64,
            util::maths::wrap_pi((p.yaw as f32 * self.angular_resolution) as f64),
        )
    }

    /// Metric pose of a fractional grid coordinate.
    pub fn grid_f_to_metric(&self, p: GridVecF) -> Pose2 {
        Pose2::new(
            self.origin.x + ((p.x + 0.5) * self.linear_resolution) as f64,
            self.origin.y + ((p.y + 0.5) * self.linear_resolution) as f64,
            util::maths::wrap_pi((p.yaw * self.angular_resolution) as f64),
        )
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn converter() -> GridConverter {
        GridConverter::new(&MapMeta3d {
            width: 32,
            height: 32,
            angle: 16,
            linear_resolution: 0.1,
            angular_resolution: std::f32::consts::PI * 2.0 / 16.0,
            origin: Pose2::new(-1.0, -2.0, 0.0),
        })
    }

    #[test]
    fn test_round_trip() {
        let conv = converter();
        let p = GridVec::new(5, 9, 3);
        let pose = conv.grid_to_metric(p);
        assert_eq!(conv.metric_to_grid(&pose), p);
    }

    #[test]
    fn test_cell_centres() {
        let conv = converter();
        let pose = conv.grid_to_metric(GridVec::new(0, 0, 0));
        assert!((pose.x - (-0.95)).abs() < 1e-6);
        assert!((pose.y - (-1.95)).abs() < 1e-6);
    }

    #[test]
    fn test_yaw_wraps() {
        let conv = converter();
        let pose = Pose2::new(0.0, 0.0, -0.1);
        let p = conv.metric_to_grid(&pose);
        assert!(p.yaw >= 0 && p.yaw < 16);
    }
}
