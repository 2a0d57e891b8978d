//! # Costmap messages
//!
//! The inflated 3-D (x, y, yaw) costmap and its local update patches, as
//! produced by the upstream perception pipeline. Payloads are row-major in
//! (yaw, y, x) order, one byte per cell, cost in [-1, 100] where -1 means
//! unknown and 100 means lethal.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pose::Pose2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Metadata describing the discretisation of a 3-D costmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapMeta3d {
    /// Number of cells along x
    pub width: u32,

    /// Number of cells along y
    pub height: u32,

    /// Number of yaw buckets
    pub angle: u32,

    /// Size of a cell in meters
    pub linear_resolution: f32,

    /// Size of a yaw bucket in radians
    pub angular_resolution: f32,

    /// Pose of cell (0, 0, 0) in the map frame
    pub origin: Pose2,
}

/// A full 3-D costmap snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Costmap3dMsg {
    /// The frame the map is expressed in
    pub frame_id: String,

    /// UTC timestamp at which the map was assembled
    pub timestamp: DateTime<Utc>,

    pub info: MapMeta3d,

    /// Row-major (yaw, y, x) cost bytes
    pub data: Vec<i8>,
}

/// A local patch of updated costs within a previously received map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Costmap3dUpdateMsg {
    /// Cell offset of the patch along x
    pub x: u32,

    /// Cell offset of the patch along y
    pub y: u32,

    /// Yaw bucket offset of the patch
    pub yaw: u32,

    pub width: u32,
    pub height: u32,
    pub angle: u32,

    /// Row-major (yaw, y, x) cost bytes
    pub data: Vec<i8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CostmapMsgError {
    #[error("Payload holds {got} cells but the metadata describes {expected}")]
    PayloadSizeMismatch { expected: usize, got: usize },

    #[error("Update patch ({x}+{w}, {y}+{h}) exceeds the map bounds ({mw}, {mh})")]
    PatchOutsideMap { x: u32, y: u32, w: u32, h: u32, mw: u32, mh: u32 },

    #[error("Map has a zero-sized dimension ({w}x{h}x{a})")]
    EmptyMap { w: u32, h: u32, a: u32 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Costmap3dMsg {
    /// Check the payload length against the metadata.
    pub fn validate(&self) -> Result<(), CostmapMsgError> {
        if self.info.width == 0 || self.info.height == 0 || self.info.angle == 0 {
            return Err(CostmapMsgError::EmptyMap {
                w: self.info.width,
                h: self.info.height,
                a: self.info.angle,
            });
        }
        let expected =
            self.info.width as usize * self.info.height as usize * self.info.angle as usize;
        if self.data.len() != expected {
            return Err(CostmapMsgError::PayloadSizeMismatch {
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }

    /// Raw cost at (x, y, yaw). Panics if out of range, callers must validate first.
    pub fn cost_at(&self, x: u32, y: u32, yaw: u32) -> i8 {
        let addr = ((yaw as usize * self.info.height as usize) + y as usize)
            * self.info.width as usize
            + x as usize;
        self.data[addr]
    }
}

impl Costmap3dUpdateMsg {
    /// Check the payload length and that the patch fits inside the given map.
    pub fn validate(&self, info: &MapMeta3d) -> Result<(), CostmapMsgError> {
        let expected = self.width as usize * self.height as usize * self.angle as usize;
        if self.data.len() != expected {
            return Err(CostmapMsgError::PayloadSizeMismatch {
                expected,
                got: self.data.len(),
            });
        }
        if self.x + self.width > info.width || self.y + self.height > info.height {
            return Err(CostmapMsgError::PatchOutsideMap {
                x: self.x,
                y: self.y,
                w: self.width,
                h: self.height,
                mw: info.width,
                mh: info.height,
            });
        }
        Ok(())
    }

    /// Raw cost at (x, y, yaw) relative to the patch origin.
    pub fn cost_at(&self, x: u32, y: u32, yaw: u32) -> i8 {
        let addr =
            ((yaw as usize * self.height as usize) + y as usize) * self.width as usize + x as usize;
        self.data[addr]
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn meta(w: u32, h: u32, a: u32) -> MapMeta3d {
        MapMeta3d {
            width: w,
            height: h,
            angle: a,
            linear_resolution: 0.1,
            angular_resolution: std::f32::consts::PI * 2.0 / a as f32,
            origin: Pose2::new(0.0, 0.0, 0.0),
        }
    }

    #[test]
    fn test_addressing() {
        let info = meta(4, 3, 2);
        let mut data = vec![0i8; 4 * 3 * 2];
        // Cell (1, 2, 1) in (yaw, y, x) row-major order
        data[(1 * 3 + 2) * 4 + 1] = 42;

        let msg = Costmap3dMsg {
            frame_id: "map".into(),
            timestamp: Utc::now(),
            info,
            data,
        };
        msg.validate().unwrap();
        assert_eq!(msg.cost_at(1, 2, 1), 42);
        assert_eq!(msg.cost_at(0, 0, 0), 0);
    }

    #[test]
    fn test_json_round_trip() {
        let msg = Costmap3dMsg {
            frame_id: "map".into(),
            timestamp: Utc::now(),
            info: meta(2, 2, 1),
            data: vec![0, 50, 100, -1],
        };

        let json = serde_json::to_string(&msg).unwrap();
        let back: Costmap3dMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.info, msg.info);
        assert_eq!(back.data, msg.data);
    }

    #[test]
    fn test_validation() {
        let msg = Costmap3dMsg {
            frame_id: "map".into(),
            timestamp: Utc::now(),
            info: meta(4, 3, 2),
            data: vec![0i8; 5],
        };
        assert!(msg.validate().is_err());

        let update = Costmap3dUpdateMsg {
            x: 3,
            y: 0,
            yaw: 0,
            width: 2,
            height: 1,
            angle: 2,
            data: vec![0i8; 4],
        };
        assert!(update.validate(&meta(4, 3, 2)).is_err());
    }
}
