//! Point type for physical coordinates.

use nalgebra::Point as NaPoint;
use serde::{Deserialize, Serialize};
use super::Vector;

/// A position in D-dimensional physical space (millimetres for CT data).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    /// Create a new point from coordinates.
    pub fn new(coords: [f64; D]) -> Self {
        Self(NaPoint::from(coords))
    }

    /// The point with all coordinates zero.
    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }

    /// Coordinates as an array.
    pub fn to_array(&self) -> [f64; D] {
        std::array::from_fn(|i| self.0.coords[i])
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        (self.0 - other.0).norm()
    }

    /// Component-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (0..D).all(|i| (self[i] - other[i]).abs() <= tolerance)
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0.coords[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Point<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0.coords[index]
    }
}

impl<const D: usize> std::ops::Sub for Point<D> {
    type Output = Vector<D>;

    fn sub(self, other: Self) -> Self::Output {
        Vector(self.0.coords - other.0.coords)
    }
}

impl<const D: usize> std::ops::Add<Vector<D>> for Point<D> {
    type Output = Self;

    fn add(self, vector: Vector<D>) -> Self::Output {
        Self(self.0 + vector.0)
    }
}
