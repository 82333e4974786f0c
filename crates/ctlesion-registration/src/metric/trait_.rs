//! Metric trait for image similarity measurement.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use ctlesion_core::image::Image;
use ctlesion_core::transform::Transform;
use crate::error::Result;

/// Metric trait for measuring similarity between images.
///
/// Metrics compute a loss value that represents the dissimilarity between
/// a fixed (reference) image and a moving image seen through `transform`.
/// Lower values indicate better alignment.
///
/// # Type Parameters
/// * `B` - The tensor backend
/// * `D` - The spatial dimensionality (2 or 3)
pub trait Metric<B: Backend, const D: usize> {
    /// Calculate the loss between the fixed image and the warped moving image.
    ///
    /// # Returns
    /// Single-element tensor holding the loss
    fn forward(
        &self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Result<Tensor<B, 1>>;

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}
