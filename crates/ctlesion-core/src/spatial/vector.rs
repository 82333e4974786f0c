//! Vector type for displacements and per-axis quantities.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// A displacement or per-axis quantity in D-dimensional space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector<const D: usize>(pub SVector<f64, D>);

impl<const D: usize> Vector<D> {
    /// Create a new vector from components.
    pub fn new(components: [f64; D]) -> Self {
        Self(SVector::from(components))
    }

    /// Create a zero vector.
    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    /// Components as an array.
    pub fn to_array(&self) -> [f64; D] {
        std::array::from_fn(|i| self.0[i])
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    /// Component-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (0..D).all(|i| (self[i] - other[i]).abs() <= tolerance)
    }
}

impl<const D: usize> std::ops::Index<usize> for Vector<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Vector<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Add for Vector<D> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl<const D: usize> std::ops::Sub for Vector<D> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self(self.0 - other.0)
    }
}

impl<const D: usize> std::ops::Mul<f64> for Vector<D> {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}
