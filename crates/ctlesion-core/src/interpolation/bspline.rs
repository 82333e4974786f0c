//! Cubic B-Spline interpolation.
//!
//! Values are first turned into B-spline coefficients by a separable
//! recursive prefilter (mirror boundaries), then sampled with the 4-tap cubic
//! basis along each axis. Sampling at grid points reproduces the input.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use crate::error::Result;
use crate::util::to_host_vec;
use super::trait_::Interpolator;

/// Pole of the cubic B-spline prefilter.
const POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2
const TOLERANCE: f64 = 1e-10;

/// Cubic B-Spline interpolator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BSplineInterpolator;

impl BSplineInterpolator {
    /// Create a new B-Spline interpolator.
    pub fn new() -> Self {
        Self
    }

    /// Basis weights `[Batch, 4]` and mirrored tap indices `[Batch, 4]` along one axis.
    fn axis_taps<B: Backend>(coord: Tensor<B, 1>, len: usize) -> (Tensor<B, 2>, Tensor<B, 2, Int>) {
        let device = coord.device();
        let [batch] = coord.dims();
        let floor = coord.clone().floor();
        let u = coord - floor.clone();

        let one_minus_u = u.clone().neg().add_scalar(1.0);
        let u2 = u.clone().powf_scalar(2.0);
        let u3 = u.clone().powf_scalar(3.0);
        let b0 = one_minus_u.powf_scalar(3.0) / 6.0;
        let b1 = (u3.clone().mul_scalar(3.0) - u2.clone().mul_scalar(6.0)).add_scalar(4.0) / 6.0;
        let b2 = (u3.clone().mul_scalar(-3.0) + u2.mul_scalar(3.0) + u.mul_scalar(3.0)).add_scalar(1.0) / 6.0;
        let b3 = u3 / 6.0;
        let weights = Tensor::cat(
            vec![
                b0.reshape([batch, 1]),
                b1.reshape([batch, 1]),
                b2.reshape([batch, 1]),
                b3.reshape([batch, 1]),
            ],
            1,
        );

        let base = (floor.int() - 1).reshape([batch, 1]);
        let taps = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device).reshape([1, 4]);
        (weights, Self::mirror(base + taps, len))
    }

    /// Reflect indices into `[0, len)` about the border samples.
    fn mirror<B: Backend>(idx: Tensor<B, 2, Int>, len: usize) -> Tensor<B, 2, Int> {
        let last = len.saturating_sub(1) as i32;
        if last == 0 {
            return idx.clamp(0, 0);
        }
        // last - |last - |i||
        idx.abs().neg().add_scalar(last).abs().neg().add_scalar(last).clamp(0, last)
    }

    fn interpolate_3d<B: Backend, const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.shape().dims;
        let (d0, d1, d2) = (dims[0], dims[1], dims[2]); // Z, Y, X
        let batch = indices.dims()[0];

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.clone().narrow(1, 1, 1).squeeze::<1>(1);
        let z = indices.narrow(1, 2, 1).squeeze::<1>(1);

        let (wx, ix) = Self::axis_taps(x, d2);
        let (wy, iy) = Self::axis_taps(y, d1);
        let (wz, iz) = Self::axis_taps(z, d0);

        let weights = wz.reshape([batch, 4, 1, 1]) * wy.reshape([batch, 1, 4, 1]) * wx.reshape([batch, 1, 1, 4]);
        let flat_idx = iz.reshape([batch, 4, 1, 1]) * (d1 * d2) as i32
            + iy.reshape([batch, 1, 4, 1]) * d2 as i32
            + ix.reshape([batch, 1, 1, 4]);

        let values = data
            .clone()
            .reshape([d0 * d1 * d2])
            .gather(0, flat_idx.reshape([batch * 64]))
            .reshape([batch, 64]);
        (values * weights.reshape([batch, 64])).sum_dim(1).squeeze::<1>(1)
    }

    fn interpolate_2d<B: Backend, const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.shape().dims;
        let (d0, d1) = (dims[0], dims[1]); // Y, X
        let batch = indices.dims()[0];

        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.narrow(1, 1, 1).squeeze::<1>(1);

        let (wx, ix) = Self::axis_taps(x, d1);
        let (wy, iy) = Self::axis_taps(y, d0);

        let weights = wy.reshape([batch, 4, 1]) * wx.reshape([batch, 1, 4]);
        let flat_idx = iy.reshape([batch, 4, 1]) * d1 as i32 + ix.reshape([batch, 1, 4]);

        let values = data
            .clone()
            .reshape([d0 * d1])
            .gather(0, flat_idx.reshape([batch * 16]))
            .reshape([batch, 16]);
        (values * weights.reshape([batch, 16])).sum_dim(1).squeeze::<1>(1)
    }
}

impl<B: Backend> Interpolator<B> for BSplineInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match D {
            3 => self.interpolate_3d(data, indices),
            2 => self.interpolate_2d(data, indices),
            _ => panic!("BSplineInterpolator only supports 2D and 3D tensors"),
        }
    }

    fn prefilter<const D: usize>(&self, data: Tensor<B, D>) -> Result<Tensor<B, D>> {
        let device = data.device();
        let dims: [usize; D] = data.dims();
        let mut values: Vec<f64> = to_host_vec(data)?.into_iter().map(f64::from).collect();
        for axis in 0..D {
            prefilter_axis(&mut values, &dims, axis);
        }
        let values: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
        Ok(Tensor::from_data(TensorData::new(values, Shape::new(dims)), &device))
    }

    fn name(&self) -> &'static str {
        "cubic B-spline"
    }
}

/// Run the 1D prefilter over every line of `values` along `axis`.
fn prefilter_axis(values: &mut [f64], dims: &[usize], axis: usize) {
    let len = dims[axis];
    if len < 2 {
        return;
    }
    let stride: usize = dims[axis + 1..].iter().product();
    let outer: usize = dims[..axis].iter().product();
    let mut line = vec![0.0; len];

    for o in 0..outer {
        for inner in 0..stride {
            let base = o * len * stride + inner;
            for (k, v) in line.iter_mut().enumerate() {
                *v = values[base + k * stride];
            }
            prefilter_line(&mut line);
            for (k, v) in line.iter().enumerate() {
                values[base + k * stride] = *v;
            }
        }
    }
}

/// Cubic B-spline coefficients of one line, in place (`line.len() >= 2`).
fn prefilter_line(line: &mut [f64]) {
    let n = line.len();
    let z = POLE;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    for v in line.iter_mut() {
        *v *= gain;
    }

    line[0] = initial_causal(line, z);
    for k in 1..n {
        line[k] += z * line[k - 1];
    }

    line[n - 1] = (z / (z * z - 1.0)) * (z * line[n - 2] + line[n - 1]);
    for k in (0..n - 1).rev() {
        line[k] = z * (line[k + 1] - line[k]);
    }
}

fn initial_causal(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    let horizon = (TOLERANCE.ln() / z.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for v in &line[1..horizon] {
            sum += zn * v;
            zn *= z;
        }
        sum
    } else {
        // mirror-symmetric boundary, exact
        let iz = 1.0 / z;
        let mut zn = z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = line[0] + z2n * line[n - 1];
        z2n *= z2n * iz;
        for v in &line[1..n - 1] {
            sum += (zn + z2n) * v;
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}
