//! Penalty trait definition.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// A loss term computed from the transform parameters alone.
///
/// # Type Parameters
/// * `B` - The backend type
/// * `T` - The transform being optimized
pub trait TransformPenalty<B: Backend, T> {
    /// Weighted penalty as a single-element tensor.
    fn compute_loss(&self, transform: &T) -> Tensor<B, 1>;

    /// Get the weight (scaling factor) for this penalty.
    fn weight(&self) -> f64;
}

/// Finite-difference helpers on grids laid out `[Z, Y, X, C]`.
pub mod utils {
    use burn::tensor::Tensor;
    use burn::tensor::backend::Backend;

    /// 6-point Laplacian of the interior of a `[Z, Y, X, C]` grid.
    ///
    /// Returns `[Z - 2, Y - 2, X - 2, C]`; every axis needs at least 3 nodes.
    pub fn interior_laplacian_3d<B: Backend>(field: Tensor<B, 4>) -> Tensor<B, 4> {
        let [d, h, w, c] = field.dims();

        let center = field.clone().slice([1..(d - 1), 1..(h - 1), 1..(w - 1), 0..c]);
        let front = field.clone().slice([0..(d - 2), 1..(h - 1), 1..(w - 1), 0..c]);
        let back = field.clone().slice([2..d, 1..(h - 1), 1..(w - 1), 0..c]);
        let top = field.clone().slice([1..(d - 1), 0..(h - 2), 1..(w - 1), 0..c]);
        let bottom = field.clone().slice([1..(d - 1), 2..h, 1..(w - 1), 0..c]);
        let left = field.clone().slice([1..(d - 1), 1..(h - 1), 0..(w - 2), 0..c]);
        let right = field.slice([1..(d - 1), 1..(h - 1), 2..w, 0..c]);

        front + back + top + bottom + left + right - center.mul_scalar(6.0)
    }
}
