//! Transform trait for spatial coordinate transformations.

use std::sync::Arc;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Transform trait for spatial coordinate transformations.
///
/// Maps points of the reference (fixed) physical space into the moving
/// physical space, which is the direction needed to pull voxel values from a
/// moving volume onto a reference grid.
///
/// This trait does not require `burn::module::Module`, so both trainable
/// transforms and plain ones can be used for resampling.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality (2 or 3)
pub trait Transform<B: Backend, const D: usize> {
    /// Apply transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, D]` containing physical points `(x, y, z)`
    ///
    /// # Returns
    /// Tensor of shape `[Batch, D]` containing the transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}

impl<B: Backend, const D: usize, T: Transform<B, D> + ?Sized> Transform<B, D> for &T {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        (**self).transform_points(points)
    }
}

impl<B: Backend, const D: usize, T: Transform<B, D> + ?Sized> Transform<B, D> for Box<T> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        (**self).transform_points(points)
    }
}

impl<B: Backend, const D: usize, T: Transform<B, D> + ?Sized> Transform<B, D> for Arc<T> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        (**self).transform_points(points)
    }
}

/// The identity mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl<B: Backend, const D: usize> Transform<B, D> for IdentityTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        points
    }
}
