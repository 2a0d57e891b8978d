//! # Configuration-space grid primitives
//!
//! The planner's world is a fixed-bound 3-D array indexed by (x, y, yaw)
//! where the yaw axis is cyclic. [`GridVec`] is the integer coordinate (and
//! offset) type, [`GridVecF`] its fractional counterpart used for sub-cell
//! interpolation, and [`Gridmap`] the backing store. A "rough" map collapses
//! the yaw axis to a single bucket.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod queue;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::ops::{Add, Index, IndexMut, Mul, Neg, Sub};

use ndarray::Array3;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An integer (x, y, yaw) grid coordinate or coordinate offset.
///
/// The yaw component is cyclic; use [`GridVec::cycle_unsigned`] to reduce a
/// coordinate into [0, angles) and [`GridVec::cycle_signed`] to reduce an
/// offset to its shortest-angle representative in [-angles/2, angles/2).
/// Lengths deliberately ignore the yaw component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridVec {
    pub x: i32,
    pub y: i32,
    pub yaw: i32,
}

/// Fractional grid coordinate, in units of cells and yaw buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridVecF {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

/// A fixed-bound 3-D grid backed by an [`Array3`].
///
/// Indexing by [`GridVec`] wraps the yaw axis; the x and y axes must be in
/// range (checked by [`Gridmap::in_bounds`] / [`Gridmap::validate`] before
/// indexing from search code).
#[derive(Debug, Clone)]
pub struct Gridmap<T> {
    size: GridVec,
    data: Array3<T>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Grid size ({0}, {1}, {2}) is not positive")]
    BadSize(i32, i32, i32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GridVec {
    pub const fn new(x: i32, y: i32, yaw: i32) -> Self {
        Self { x, y, yaw }
    }

    /// The yaw-collapsed projection of this coordinate.
    pub fn rough(&self) -> Self {
        Self::new(self.x, self.y, 0)
    }

    /// Squared planar length. The yaw component is not included.
    pub fn sqlen(&self) -> i32 {
        self.x * self.x + self.y * self.y
    }

    /// Planar length in cells.
    pub fn len(&self) -> f32 {
        (self.sqlen() as f32).sqrt()
    }

    /// Ratio between the true segment length and the number of integer steps
    /// used to rasterise it. Multiplying a per-step cost sum by this factor
    /// converts it back into a per-length integral.
    pub fn grid_to_len_factor(&self) -> f32 {
        let l = self.len();
        let steps = l.floor();
        if steps < 1.0 {
            1.0
        } else {
            l / steps
        }
    }

    /// Reduce the yaw component into [0, angles).
    pub fn cycle_unsigned(&self, angles: i32) -> Self {
        Self::new(self.x, self.y, self.yaw.rem_euclid(angles))
    }

    /// Reduce the yaw component to the shortest-angle representative in
    /// [-angles/2, angles/2).
    pub fn cycle_signed(&self, angles: i32) -> Self {
        let yaw = (self.yaw + angles / 2).rem_euclid(angles) - angles / 2;
        Self::new(self.x, self.y, yaw)
    }

    pub fn as_f(&self) -> GridVecF {
        GridVecF::new(self.x as f32, self.y as f32, self.yaw as f32)
    }
}

impl GridVecF {
    pub const fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self { x, y, yaw }
    }

    /// Planar length in cells. The yaw component is not included.
    pub fn len(&self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn sqlen(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Nearest integer coordinate.
    pub fn round(&self) -> GridVec {
        GridVec::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.yaw.round() as i32,
        )
    }

    /// Rotate the planar components by `angle` radians and advance the yaw
    /// component (given in radians here) by the same amount.
    pub fn rotate(&self, angle: f32) -> Self {
        let (sin_v, cos_v) = angle.sin_cos();
        Self::new(
            cos_v * self.x - sin_v * self.y,
            sin_v * self.x + cos_v * self.y,
            self.yaw + angle,
        )
    }
}

impl<T: Clone> Gridmap<T> {
    /// Allocate a grid of the given size filled with `fill`.
    pub fn new(size: GridVec, fill: T) -> Result<Self, GridError> {
        if size.x <= 0 || size.y <= 0 || size.yaw <= 0 {
            return Err(GridError::BadSize(size.x, size.y, size.yaw));
        }
        Ok(Self {
            size,
            data: Array3::from_elem(
                (size.x as usize, size.y as usize, size.yaw as usize),
                fill,
            ),
        })
    }

    /// Overwrite every cell with `value`, keeping the allocation.
    pub fn clear(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn size(&self) -> GridVec {
        self.size
    }

    /// Number of yaw buckets.
    pub fn angles(&self) -> i32 {
        self.size.yaw
    }

    /// True if the planar components are inside the map. Yaw always wraps.
    pub fn in_bounds(&self, p: GridVec) -> bool {
        p.x >= 0 && p.x < self.size.x && p.y >= 0 && p.y < self.size.y
    }

    /// True if the planar components are at least `margin` cells away from
    /// every map edge.
    pub fn validate(&self, p: GridVec, margin: i32) -> bool {
        p.x >= margin
            && p.x < self.size.x - margin
            && p.y >= margin
            && p.y < self.size.y - margin
    }

    fn addr(&self, p: GridVec) -> (usize, usize, usize) {
        (
            p.x as usize,
            p.y as usize,
            p.yaw.rem_euclid(self.size.yaw) as usize,
        )
    }

    pub fn get(&self, p: GridVec) -> &T {
        &self.data[self.addr(p)]
    }

    pub fn get_mut(&mut self, p: GridVec) -> &mut T {
        let addr = self.addr(p);
        &mut self.data[addr]
    }
}

impl<T: Clone> Index<GridVec> for Gridmap<T> {
    type Output = T;

    fn index(&self, p: GridVec) -> &T {
        self.get(p)
    }
}

impl<T: Clone> IndexMut<GridVec> for Gridmap<T> {
    fn index_mut(&mut self, p: GridVec) -> &mut T {
        self.get_mut(p)
    }
}

impl Add for GridVec {
    type Output = GridVec;

    fn add(self, rhs: GridVec) -> GridVec {
        GridVec::new(self.x + rhs.x, self.y + rhs.y, self.yaw + rhs.yaw)
    }
}

impl Sub for GridVec {
    type Output = GridVec;

    fn sub(self, rhs: GridVec) -> GridVec {
        GridVec::new(self.x - rhs.x, self.y - rhs.y, self.yaw - rhs.yaw)
    }
}

impl Neg for GridVec {
    type Output = GridVec;

    fn neg(self) -> GridVec {
        GridVec::new(-self.x, -self.y, -self.yaw)
    }
}

impl Add for GridVecF {
    type Output = GridVecF;

    fn add(self, rhs: GridVecF) -> GridVecF {
        GridVecF::new(self.x + rhs.x, self.y + rhs.y, self.yaw + rhs.yaw)
    }
}

impl Sub for GridVecF {
    type Output = GridVecF;

    fn sub(self, rhs: GridVecF) -> GridVecF {
        GridVecF::new(self.x - rhs.x, self.y - rhs.y, self.yaw - rhs.yaw)
    }
}

impl Mul<f32> for GridVecF {
    type Output = GridVecF;

    fn mul(self, rhs: f32) -> GridVecF {
        GridVecF::new(self.x * rhs, self.y * rhs, self.yaw * rhs)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cycle() {
        let angles = 16;

        assert_eq!(GridVec::new(0, 0, 17).cycle_unsigned(angles).yaw, 1);
        assert_eq!(GridVec::new(0, 0, -1).cycle_unsigned(angles).yaw, 15);
        assert_eq!(GridVec::new(0, 0, 15).cycle_signed(angles).yaw, -1);
        assert_eq!(GridVec::new(0, 0, 8).cycle_signed(angles).yaw, -8);
        assert_eq!(GridVec::new(0, 0, 7).cycle_signed(angles).yaw, 7);
        assert_eq!(GridVec::new(0, 0, -9).cycle_signed(angles).yaw, 7);
    }

    #[test]
    fn test_lengths() {
        let d = GridVec::new(3, 4, 5);
        assert_eq!(d.sqlen(), 25);
        assert_eq!(d.len(), 5.0);

        // A diagonal has sqrt(2)/1 ratio between length and steps
        let diag = GridVec::new(1, 1, 0);
        assert!((diag.grid_to_len_factor() - 2.0f32.sqrt()).abs() < 1e-6);
        let straight = GridVec::new(4, 0, 0);
        assert!((straight.grid_to_len_factor() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gridmap_yaw_wrap() {
        let mut map = Gridmap::new(GridVec::new(4, 4, 8), 0u8).unwrap();
        map[GridVec::new(1, 2, 3)] = 42;

        // Same cell addressed with a wrapped yaw
        assert_eq!(map[GridVec::new(1, 2, 11)], 42);
        assert_eq!(map[GridVec::new(1, 2, -5)], 42);
    }

    #[test]
    fn test_validate() {
        let map = Gridmap::new(GridVec::new(10, 10, 4), 0u8).unwrap();

        assert!(map.validate(GridVec::new(2, 2, 0), 2));
        assert!(!map.validate(GridVec::new(1, 2, 0), 2));
        assert!(!map.validate(GridVec::new(2, 8, 0), 2));
        assert!(map.in_bounds(GridVec::new(9, 9, 0)));
        assert!(!map.in_bounds(GridVec::new(10, 9, 0)));
    }
}
