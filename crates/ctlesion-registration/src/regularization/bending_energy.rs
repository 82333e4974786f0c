//! Bending energy of a cubic B-spline control grid.
//!
//! R(u) = w · mean(|∇²c|²)
//!
//! where `c` are the control point displacements in units of the control
//! point spacing.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use ctlesion_core::transform::BSplineTransform;
use super::trait_::utils::interior_laplacian_3d;
use super::trait_::TransformPenalty;

/// Bending energy penalty for 3D B-spline transforms.
#[derive(Clone, Debug)]
pub struct BendingEnergyPenalty {
    weight: f64,
}

impl BendingEnergyPenalty {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }
}

impl<B: Backend> TransformPenalty<B, BSplineTransform<B, 3>> for BendingEnergyPenalty {
    fn compute_loss(&self, transform: &BSplineTransform<B, 3>) -> Tensor<B, 1> {
        let [nx, ny, nz] = transform.grid_size();
        let coefficients = transform.coefficients();
        let device = coefficients.device();
        if nx < 3 || ny < 3 || nz < 3 {
            return Tensor::zeros([1], &device);
        }

        let spacing = transform.control_point_spacing();
        let scale = Tensor::<B, 1>::from_floats(
            [1.0 / spacing[0] as f32, 1.0 / spacing[1] as f32, 1.0 / spacing[2] as f32],
            &device,
        )
        .reshape([1, 3]);

        // coefficients are x fastest: [Z, Y, X, 3]
        let grid = (coefficients * scale).reshape([nz, ny, nx, 3]);
        interior_laplacian_3d(grid).powf_scalar(2.0).mean().mul_scalar(self.weight)
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}
