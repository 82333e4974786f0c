//! Direction cosine matrices.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::Vector;

/// Orientation of the image axes in physical space.
///
/// Column `i` is the unit direction of index axis `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Axis-aligned orientation.
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Try to compute the inverse of the direction matrix.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Check if the matrix is orthogonal within `1e-6`.
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        let identity = SMatrix::<f64, D, D>::identity();
        (product - identity).abs().max() < 1e-6
    }

    /// Element-wise comparison with an absolute tolerance.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.0 - other.0).abs().max() <= tolerance
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}
