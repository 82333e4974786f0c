//! Nearest neighbor interpolation implementation.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use super::trait_::Interpolator;

/// Nearest Neighbor Interpolator.
///
/// Rounds to the nearest integer coordinate, so a `{0, 1}` label volume
/// stays a `{0, 1}` label volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    /// Create a new nearest neighbor interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match D {
            3 => self.interpolate_3d(data, indices),
            2 => self.interpolate_2d(data, indices),
            _ => panic!("NearestNeighborInterpolator only supports 2D and 3D tensors"),
        }
    }

    fn preserves_labels(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "nearest neighbour"
    }
}

impl NearestNeighborInterpolator {
    fn interpolate_3d<B: Backend, const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.shape().dims;
        let (d0, d1, d2) = (dims[0], dims[1], dims[2]); // Z, Y, X

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x_i = x.round().clamp(0.0, (d2 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d1 - 1) as f64).int();
        let z_i = z.round().clamp(0.0, (d0 - 1) as f64).int();

        let idx = z_i * (d1 * d2) as i32 + y_i * d2 as i32 + x_i;
        data.clone().reshape([d0 * d1 * d2]).gather(0, idx)
    }

    fn interpolate_2d<B: Backend, const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.shape().dims;
        let (d0, d1) = (dims[0], dims[1]); // Y, X

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.narrow(1, 1, 1).squeeze::<1>(1);

        let x_i = x.round().clamp(0.0, (d1 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d0 - 1) as f64).int();

        let idx = y_i * d1 as i32 + x_i;
        data.clone().reshape([d0 * d1]).gather(0, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_neighbor_rounding_2d() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0], [2.0, 3.0]], &device);
        let interpolator = NearestNeighborInterpolator::new();

        // (x, y): 0.4 rounds to 0, 0.6 rounds to 1; (1, 0) is column 1 of row 0
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.4, 0.4], [0.6, 0.6], [1.0, 0.0]], &device);
        let values = interpolator.interpolate(&data, indices).into_data();
        assert_eq!(values.as_slice::<f32>().unwrap(), &[0.0, 3.0, 1.0]);
    }

    #[test]
    fn test_nearest_neighbor_3d_keeps_labels() {
        let device = Default::default();
        // [Z=2, Y=2, X=2], only (x=1, y=0, z=1) set
        let data = Tensor::<TestBackend, 3>::from_floats(
            [[[0.0, 0.0], [0.0, 0.0]], [[0.0, 1.0], [0.0, 0.0]]],
            &device,
        );
        let interpolator = NearestNeighborInterpolator::new();
        let indices = Tensor::<TestBackend, 2>::from_floats(
            [[0.9, 0.2, 0.7], [0.5, 0.5, 0.5], [-3.0, 9.0, 0.0]],
            &device,
        );
        let values = interpolator.interpolate(&data, indices).into_data();
        let values = values.as_slice::<f32>().unwrap();
        assert_eq!(values[0], 1.0);
        assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert!(Interpolator::<TestBackend>::preserves_labels(&interpolator));
    }
}
