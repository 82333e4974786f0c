//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use crate::error::Result;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// Interpolators are used to sample image values at non-integer coordinates,
/// which is essential for image registration and resampling. Indices outside
/// the grid are clamped to the border; callers that need a background value
/// mask those points themselves.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values from a tensor at given continuous indices.
    ///
    /// # Arguments
    /// * `data` - The source tensor (3D volume `[Z, Y, X]` or 2D image `[Y, X]`),
    ///   already passed through [`Interpolator::prefilter`]
    /// * `indices` - The indices at which to interpolate `[Batch, Rank]`, columns `(x, y, z)`
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Turn voxel values into the coefficients [`Interpolator::interpolate`]
    /// expects. Identity for interpolators that sample values directly.
    fn prefilter<const D: usize>(&self, data: Tensor<B, D>) -> Result<Tensor<B, D>> {
        Ok(data)
    }

    /// Whether sampled values are always values present in the input.
    fn preserves_labels(&self) -> bool {
        false
    }

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;
}
