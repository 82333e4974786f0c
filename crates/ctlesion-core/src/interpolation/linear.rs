//! Linear interpolation implementation.
//!
//! This module provides linear interpolation for 2D and 3D data.

use burn::tensor::{Int, Tensor};
use burn::tensor::backend::Backend;
use super::trait_::Interpolator;

/// Linear Interpolator.
///
/// Performs linear interpolation (bilinear for 2D, trilinear for 3D).
/// Differentiable with respect to the sampling indices, which the solvers
/// rely on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match D {
            3 => self.interpolate_3d(data, indices),
            2 => self.interpolate_2d(data, indices),
            _ => panic!("LinearInterpolator only supports 2D and 3D tensors"),
        }
    }

    fn name(&self) -> &'static str {
        "trilinear"
    }
}

impl LinearInterpolator {
    fn interpolate_3d<B: Backend, const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let shape = data.shape();
        let d0 = shape.dims[0]; // Z
        let d1 = shape.dims[1]; // Y
        let d2 = shape.dims[2]; // X
        let batch_size = indices.dims()[0];
        let device = indices.device();

        // indices: [Batch, 3] -> (x, y, z)
        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();
        let z0 = z.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();
        let wz = z - z0.clone();

        let x1 = x0.clone() + 1.0;
        let y1 = y0.clone() + 1.0;
        let z1 = z0.clone() + 1.0;

        let x0_i = x0.clamp(0.0, (d2 - 1) as f64).int();
        let y0_i = y0.clamp(0.0, (d1 - 1) as f64).int();
        let z0_i = z0.clamp(0.0, (d0 - 1) as f64).int();

        let x1_i = x1.clamp(0.0, (d2 - 1) as f64).int();
        let y1_i = y1.clamp(0.0, (d1 - 1) as f64).int();
        let z1_i = z1.clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;

        let flat_data = data.clone().reshape([d0 * d1 * d2]);

        let v000 = Self::gather_3d(&flat_data, &x0_i, &y0_i, &z0_i, stride_y, stride_z);
        let v001 = Self::gather_3d(&flat_data, &x0_i, &y0_i, &z1_i, stride_y, stride_z);
        let v010 = Self::gather_3d(&flat_data, &x0_i, &y1_i, &z0_i, stride_y, stride_z);
        let v011 = Self::gather_3d(&flat_data, &x0_i, &y1_i, &z1_i, stride_y, stride_z);
        let v100 = Self::gather_3d(&flat_data, &x1_i, &y0_i, &z0_i, stride_y, stride_z);
        let v101 = Self::gather_3d(&flat_data, &x1_i, &y0_i, &z1_i, stride_y, stride_z);
        let v110 = Self::gather_3d(&flat_data, &x1_i, &y1_i, &z0_i, stride_y, stride_z);
        let v111 = Self::gather_3d(&flat_data, &x1_i, &y1_i, &z1_i, stride_y, stride_z);

        let one = Tensor::<B, 1>::ones([batch_size], &device);
        let one_minus_wx = one.clone() - wx.clone();
        let one_minus_wy = one.clone() - wy.clone();
        let one_minus_wz = one - wz.clone();

        // Along X
        let c00 = v000 * one_minus_wx.clone() + v100 * wx.clone();
        let c01 = v001 * one_minus_wx.clone() + v101 * wx.clone();
        let c10 = v010 * one_minus_wx.clone() + v110 * wx.clone();
        let c11 = v011 * one_minus_wx + v111 * wx;

        // Along Y
        let c0 = c00 * one_minus_wy.clone() + c10 * wy.clone();
        let c1 = c01 * one_minus_wy + c11 * wy;

        // Along Z
        c0 * one_minus_wz + c1 * wz
    }

    #[inline]
    fn gather_3d<B: Backend>(
        flat_data: &Tensor<B, 1>,
        xi: &Tensor<B, 1, Int>,
        yi: &Tensor<B, 1, Int>,
        zi: &Tensor<B, 1, Int>,
        stride_y: i32,
        stride_z: i32,
    ) -> Tensor<B, 1> {
        let idx = zi.clone() * stride_z + yi.clone() * stride_y + xi.clone();
        flat_data.clone().gather(0, idx)
    }

    fn interpolate_2d<B: Backend, const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let shape = data.shape();
        let d0 = shape.dims[0]; // Y
        let d1 = shape.dims[1]; // X
        let batch_size = indices.dims()[0];
        let device = indices.device();

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.narrow(1, 1, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();

        let x1 = x0.clone() + 1.0;
        let y1 = y0.clone() + 1.0;

        let x0_i = x0.clamp(0.0, (d1 - 1) as f64).int();
        let y0_i = y0.clamp(0.0, (d0 - 1) as f64).int();
        let x1_i = x1.clamp(0.0, (d1 - 1) as f64).int();
        let y1_i = y1.clamp(0.0, (d0 - 1) as f64).int();

        let stride_y = d1 as i32;
        let flat_data = data.clone().reshape([d0 * d1]);

        let v00 = flat_data.clone().gather(0, y0_i.clone() * stride_y + x0_i.clone());
        let v01 = flat_data.clone().gather(0, y1_i.clone() * stride_y + x0_i);
        let v10 = flat_data.clone().gather(0, y0_i * stride_y + x1_i.clone());
        let v11 = flat_data.gather(0, y1_i * stride_y + x1_i);

        let one = Tensor::<B, 1>::ones([batch_size], &device);
        let one_minus_wx = one.clone() - wx.clone();
        let one_minus_wy = one - wy.clone();

        let c0 = v00 * one_minus_wx.clone() + v10 * wx.clone();
        let c1 = v01 * one_minus_wx + v11 * wx;

        c0 * one_minus_wy + c1 * wy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_linear_interpolator_3d_axes() {
        let device = Default::default();
        // [Z=2, Y=2, X=2], value = 100 z + 10 y + x
        let data_vec = vec![0.0, 1.0, 10.0, 11.0, 100.0, 101.0, 110.0, 111.0];
        let data = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(data_vec, burn::tensor::Shape::new([2, 2, 2])),
            &device,
        );
        let interpolator = LinearInterpolator::new();

        let indices = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.5, 0.5, 0.5]],
            &device,
        );
        let result = interpolator.interpolate(&data, indices).into_data();
        let slice = result.as_slice::<f32>().unwrap();

        assert_eq!(&slice[..4], &[0.0, 1.0, 10.0, 100.0]);
        assert!((slice[4] - 55.5).abs() < 1e-5, "Expected 55.5, got {}", slice[4]);
    }

    #[test]
    fn test_linear_interpolator_2d_clamps_out_of_bounds() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0], [2.0, 3.0]], &device);
        let interpolator = LinearInterpolator::new();

        let indices = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5], [-1.0, -1.0], [5.0, 5.0]], &device);
        let result = interpolator.interpolate(&data, indices).into_data();
        let slice = result.as_slice::<f32>().unwrap();

        assert!((slice[0] - 1.5).abs() < 1e-6);
        assert_eq!(slice[1], 0.0);
        assert_eq!(slice[2], 3.0);
    }
}
