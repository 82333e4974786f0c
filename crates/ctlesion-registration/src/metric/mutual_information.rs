//! Mattes mutual information with Parzen windowing.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use ctlesion_core::image::Image;
use ctlesion_core::interpolation::{Interpolator, LinearInterpolator, NearestNeighborInterpolator};
use ctlesion_core::transform::Transform;
use crate::error::{RegistrationError, Result};
use super::trait_::Metric;

/// Mutual Information Metric using Parzen Window estimation.
///
/// Computes the mutual information between the fixed image and the warped
/// moving image:
/// MI(F, M) = H(F) + H(M) - H(F, M)
/// and returns `-MI` as the loss.
///
/// * Intensities are mapped onto `num_bins` bins using the fixed sample range
///   and the full moving image range; each sample spreads a unit mass over the
///   bins with a Gaussian kernel of width `parzen_sigma` (in bins).
/// * The fixed image is sampled at `num_samples` voxels spread evenly over
///   its memory order, the same voxels on every call.
/// * Samples mapping outside the moving image, or outside the optional moving
///   mask, do not contribute.
pub struct MattesMutualInformation<B: Backend, const D: usize> {
    interpolator: LinearInterpolator,
    num_bins: usize,
    parzen_sigma: f64,
    num_samples: usize,
    moving_mask: Option<Image<B, D>>,
}

impl<B: Backend, const D: usize> MattesMutualInformation<B, D> {
    /// Create a new metric.
    ///
    /// # Arguments
    /// * `num_bins` - Number of histogram bins per image
    /// * `num_samples` - Number of fixed voxels sampled; `0` samples every voxel
    pub fn new(num_bins: usize, num_samples: usize) -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
            num_bins,
            parzen_sigma: 1.0,
            num_samples,
            moving_mask: None,
        }
    }

    /// Set the Parzen kernel width in bins.
    pub fn with_parzen_sigma(mut self, sigma: f64) -> Self {
        self.parzen_sigma = sigma;
        self
    }

    /// Only count samples whose moving point falls inside `mask` (`> 0`).
    pub fn with_moving_mask(mut self, mask: Image<B, D>) -> Self {
        self.moving_mask = Some(mask);
        self
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Map intensities onto continuous bin coordinates `[0, num_bins - 1]`.
    fn to_bins(&self, values: Tensor<B, 1>, min: Tensor<B, 1>, max: Tensor<B, 1>) -> Tensor<B, 1> {
        let top = (self.num_bins - 1) as f64;
        let range = (max - min.clone()).add_scalar(1e-6);
        ((values - min) / range * top).clamp(0.0, top)
    }

    /// Parzen weights `[N, num_bins]`, each row summing to one.
    fn parzen_weights(&self, bins_coord: Tensor<B, 1>) -> Tensor<B, 2> {
        let n = bins_coord.dims()[0];
        let device = bins_coord.device();
        let centers = Tensor::<B, 1, Int>::arange(0..self.num_bins as i64, &device)
            .float()
            .reshape([1, self.num_bins]);

        let diff = bins_coord.reshape([n, 1]) - centers;
        let weights = (diff.powf_scalar(2.0) * (-0.5 / (self.parzen_sigma * self.parzen_sigma))).exp();
        let row_mass = weights.clone().sum_dim(1).add_scalar(1e-10);
        weights / row_mass
    }
}

impl<B: Backend, const D: usize> Default for MattesMutualInformation<B, D> {
    fn default() -> Self {
        Self::new(32, 2048)
    }
}

impl<B: Backend, const D: usize> Metric<B, D> for MattesMutualInformation<B, D> {
    fn forward(
        &self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Result<Tensor<B, 1>> {
        if self.num_bins < 2 {
            return Err(RegistrationError::metric(format!("need at least 2 bins, got {}", self.num_bins)));
        }
        let device = fixed.data().device();
        let fixed_geometry = fixed.geometry();
        let total = fixed_geometry.num_voxels();

        let positions = sample_positions(total, self.num_samples);
        let n = positions.len();
        if n == 0 {
            return Err(RegistrationError::metric("fixed image has no voxels"));
        }

        // 1. Fixed samples and their moving-space positions
        let fixed_indices = sample_indices::<B, D>(fixed.shape(), &positions, &device);
        let flat: Vec<i64> = positions.iter().map(|p| *p as i64).collect();
        let flat = Tensor::<B, 1, Int>::from_data(TensorData::new(flat, Shape::new([n])), &device);
        let fixed_values = fixed.data().clone().reshape([total]).select(0, flat);

        let fixed_points = fixed_geometry.index_to_world_tensor(fixed_indices);
        let moving_points = transform.transform_points(fixed_points);
        let moving_indices = moving.geometry().world_to_index_tensor(moving_points.clone())?;

        // 2. Sample weights
        let mut weights = inside_field_of_view(moving_indices.clone(), moving.shape());
        if let Some(mask) = &self.moving_mask {
            let mask_indices = mask.geometry().world_to_index_tensor(moving_points)?;
            let in_mask = NearestNeighborInterpolator
                .interpolate(mask.data(), mask_indices.clone())
                .greater_elem(0.0)
                .float();
            weights = weights * in_mask * inside_field_of_view(mask_indices, mask.shape());
        }

        let moving_values = self.interpolator.interpolate(moving.data(), moving_indices);

        // 3. Histograms
        let fixed_bins = self.to_bins(fixed_values.clone(), fixed_values.clone().min(), fixed_values.max());
        let moving_total = moving.geometry().num_voxels();
        let moving_all = moving.data().clone().reshape([moving_total]);
        let moving_bins = self.to_bins(moving_values, moving_all.clone().min(), moving_all.max());

        let wf = self.parzen_weights(fixed_bins) * weights.reshape([n, 1]);
        let wm = self.parzen_weights(moving_bins);
        let joint = wf.transpose().matmul(wm); // [bins, bins]
        let mass = joint.clone().sum().reshape([1, 1]).add_scalar(1e-10);
        let p_joint = joint / mass;

        let p_fixed = p_joint.clone().sum_dim(1);
        let p_moving = p_joint.clone().sum_dim(0);

        // 4. Loss = -MI = H(F, M) - H(F) - H(M)
        Ok(entropy(p_joint) - entropy(p_fixed) - entropy(p_moving))
    }

    fn name(&self) -> &'static str {
        "MattesMutualInformation"
    }
}

fn entropy<B: Backend, const R: usize>(p: Tensor<B, R>) -> Tensor<B, 1> {
    (p.clone() * p.add_scalar(1e-10).log()).sum().neg()
}

/// Flat positions of `num_samples` voxels spread evenly over `total` voxels.
/// `0`, or more samples than voxels, selects every voxel.
pub(crate) fn sample_positions(total: usize, num_samples: usize) -> Vec<usize> {
    if num_samples == 0 || num_samples >= total {
        return (0..total).collect();
    }
    let stride = total as f64 / num_samples as f64;
    (0..num_samples)
        .map(|k| (((k as f64 + 0.5) * stride) as usize).min(total - 1))
        .collect()
}

/// Continuous indices `[N, D]` (columns `(x, y, z)`) of flat voxel positions.
fn sample_indices<B: Backend, const D: usize>(shape: [usize; D], positions: &[usize], device: &B::Device) -> Tensor<B, 2> {
    let mut grid = Vec::with_capacity(positions.len() * D);
    for &flat in positions {
        let mut rest = flat;
        for axis in (0..D).rev() {
            grid.push((rest % shape[axis]) as f32);
            rest /= shape[axis];
        }
    }
    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([positions.len() * D])), device)
        .reshape([positions.len(), D])
}

/// `1.0` for indices inside `[-0.5, n - 0.5]` on every axis, else `0.0`.
pub(crate) fn inside_field_of_view<B: Backend, const D: usize>(indices: Tensor<B, 2>, shape: [usize; D]) -> Tensor<B, 1> {
    let batch = indices.dims()[0];
    let mut outside = Tensor::<B, 1>::zeros([batch], &indices.device());
    for axis in 0..D {
        let extent = shape[D - 1 - axis] as f64;
        let column = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        outside = outside + column.clone().lower_elem(-0.5).float() + column.greater_elem(extent - 0.5).float();
    }
    outside.lower_elem(0.5).float()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ctlesion_core::image::ImageGeometry;
    use ctlesion_core::transform::{AffineMatrix, IdentityTransform};
    use ctlesion_core::util::to_host_scalar;

    type B = NdArray<f32>;

    fn blob(size: usize, center: [f64; 3]) -> Image<B, 3> {
        let geometry = ImageGeometry::<3>::unit([size, size, size]);
        let mut data = Vec::with_capacity(size * size * size);
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let d2 = (x as f64 - center[0]).powi(2) + (y as f64 - center[1]).powi(2) + (z as f64 - center[2]).powi(2);
                    data.push((100.0 * (-d2 / 20.0).exp()) as f32);
                }
            }
        }
        Image::from_vec(data, &geometry, &Default::default()).unwrap()
    }

    #[test]
    fn test_sample_positions() {
        assert_eq!(sample_positions(10, 3), vec![1, 5, 8]);
        assert_eq!(sample_positions(4, 0), vec![0, 1, 2, 3]);
        assert_eq!(sample_positions(4, 9), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_aligned_images_score_best() {
        let image = blob(12, [6.0, 6.0, 6.0]);
        let metric = MattesMutualInformation::<B, 3>::new(32, 0);

        let aligned = to_host_scalar(metric.forward(&image, &image, &IdentityTransform).unwrap()).unwrap();
        let shifted = to_host_scalar(
            metric.forward(&image, &image, &AffineMatrix::from_translation([3.0, 0.0, 0.0])).unwrap(),
        )
        .unwrap();

        assert!(aligned.is_finite());
        assert!(aligned < 0.0);
        assert!(aligned < shifted, "aligned {} shifted {}", aligned, shifted);
    }

    #[test]
    fn test_forward_is_deterministic() {
        let fixed = blob(10, [5.0, 4.0, 5.0]);
        let moving = blob(10, [4.0, 5.0, 5.0]);
        let metric = MattesMutualInformation::<B, 3>::new(64, 300);
        let a = to_host_scalar(metric.forward(&fixed, &moving, &IdentityTransform).unwrap()).unwrap();
        let b = to_host_scalar(metric.forward(&fixed, &moving, &IdentityTransform).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_moving_mask_contributes_nothing() {
        let image = blob(8, [4.0, 4.0, 4.0]);
        let mask = Image::from_vec(vec![0.0; 512], &image.geometry(), &Default::default()).unwrap();
        let metric = MattesMutualInformation::<B, 3>::new(16, 0).with_moving_mask(mask);
        let loss = to_host_scalar(metric.forward(&image, &image, &IdentityTransform).unwrap()).unwrap();
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn test_samples_outside_moving_image_are_dropped() {
        let image = blob(8, [4.0, 4.0, 4.0]);
        let metric = MattesMutualInformation::<B, 3>::new(16, 0);
        let loss = metric.forward(&image, &image, &AffineMatrix::from_translation([100.0, 0.0, 0.0])).unwrap();
        assert!(to_host_scalar(loss).unwrap().abs() < 1e-6);
    }
}
