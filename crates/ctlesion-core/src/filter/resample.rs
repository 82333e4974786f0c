//! Resample image filter.
//!
//! This module provides ResampleImageFilter which resamples an image
//! into a new coordinate system using a transform and an interpolator.

use std::marker::PhantomData;
use burn::tensor::{Shape, Tensor};
use burn::tensor::backend::Backend;
use tracing::debug;
use crate::error::{CoreError, Result};
use crate::image::{generate_grid_chunk, Image, ImageGeometry, Volume};
use crate::interpolation::Interpolator;
use crate::transform::Transform;

/// Number of output voxels processed per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 16;

/// Resample image filter.
///
/// For every voxel of the output grid, the physical point is mapped through
/// the transform (output/reference space to input/moving space), converted to
/// a continuous index of the input image and interpolated there. Points that
/// fall outside the input field of view receive the default pixel value.
///
/// The output grid is processed in chunks, so memory stays bounded for
/// template-sized grids.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
/// * `D` - The dimensionality (2 or 3)
pub struct ResampleImageFilter<B, T, I, const D: usize>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    geometry: ImageGeometry<D>,
    transform: T,
    interpolator: I,
    default_pixel_value: f64,
    chunk_size: usize,
    _phantom: PhantomData<B>,
}

impl<B, T, I, const D: usize> ResampleImageFilter<B, T, I, D>
where
    B: Backend,
    T: Transform<B, D>,
    I: Interpolator<B>,
{
    /// Create a new resample filter onto the output grid `geometry`.
    pub fn new(geometry: ImageGeometry<D>, transform: T, interpolator: I) -> Self {
        Self {
            geometry,
            transform,
            interpolator,
            default_pixel_value: 0.0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            _phantom: PhantomData,
        }
    }

    /// Create from a reference image, using its grid as the output grid.
    pub fn new_from_reference(reference: &Image<B, D>, transform: T, interpolator: I) -> Self {
        Self::new(reference.geometry(), transform, interpolator)
    }

    /// Set default pixel value for outside the field of view.
    pub fn with_default_pixel_value(mut self, value: f64) -> Self {
        self.default_pixel_value = value;
        self
    }

    /// Set the number of output voxels per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Apply filter to an input image.
    pub fn apply(&self, input: &Image<B, D>) -> Result<Image<B, D>> {
        let device = input.data().device();
        let input_geometry = input.geometry();
        let input_shape = input_geometry.shape();
        let output_shape = self.geometry.shape();
        let total = self.geometry.num_voxels();

        let coefficients = self.interpolator.prefilter(input.data().clone())?;

        let mut chunks = Vec::with_capacity(total.div_ceil(self.chunk_size));
        let mut start = 0;
        while start < total {
            let len = self.chunk_size.min(total - start);

            let output_indices = generate_grid_chunk::<B, D>(output_shape, start, len, &device);
            let output_points = self.geometry.index_to_world_tensor(output_indices);
            let input_points = self.transform.transform_points(output_points);
            let input_indices = input_geometry.world_to_index_tensor(input_points)?;

            let outside = Self::outside_mask(input_indices.clone(), input_shape);
            let values = self.interpolator.interpolate(&coefficients, input_indices);
            chunks.push(values.mask_fill(outside, self.default_pixel_value));

            start += len;
        }

        let output = if chunks.is_empty() {
            Tensor::<B, 1>::zeros([0], &device)
        } else {
            Tensor::cat(chunks, 0)
        };
        let output_data = output.reshape(Shape::new(output_shape));

        Ok(Image::on_grid(output_data, &self.geometry))
    }

    /// Apply filter to a volume, refusing interpolators that would break a
    /// binary label volume.
    pub fn apply_volume(&self, input: &Volume<B, D>) -> Result<Volume<B, D>> {
        if input.kind().is_label() && !self.interpolator.preserves_labels() {
            return Err(CoreError::KindViolation {
                operation: "resample",
                kind: input.kind(),
                detail: format!("{} interpolation", self.interpolator.name()),
            });
        }
        debug!(
            kind = ?input.kind(),
            interpolator = self.interpolator.name(),
            shape = ?self.geometry.shape(),
            "resampling volume"
        );
        let image = self.apply(input.image())?;
        Ok(match input.kind() {
            crate::image::VolumeKind::BinaryLabel => Volume::label(image),
            crate::image::VolumeKind::ContinuousIntensity => Volume::continuous(image),
        })
    }

    /// `[Batch]` mask of indices outside `[-0.5, n - 0.5]` on any axis.
    fn outside_mask(indices: Tensor<B, 2>, shape: [usize; D]) -> Tensor<B, 1, burn::tensor::Bool> {
        let batch = indices.dims()[0];
        let mut violations = Tensor::<B, 1>::zeros([batch], &indices.device());
        for axis in 0..D {
            // index axis `axis` is tensor axis D - 1 - axis
            let extent = shape[D - 1 - axis] as f64;
            let column = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
            violations = violations
                + column.clone().lower_elem(-0.5).float()
                + column.greater_elem(extent - 0.5).float();
        }
        violations.greater_elem(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use crate::interpolation::{Interpolation, LinearInterpolator, NearestNeighborInterpolator};
    use crate::spatial::{Direction, Point, Spacing};
    use crate::transform::{AffineMatrix, IdentityTransform};

    type TestBackend = NdArray<f32>;

    fn square_image() -> Image<TestBackend, 2> {
        // 10x10 image with a 2x2 square at (4..=5, 4..=5)
        let mut data = vec![0.0; 100];
        for (y, x) in [(4, 4), (4, 5), (5, 4), (5, 5)] {
            data[y * 10 + x] = 1.0;
        }
        let geometry = ImageGeometry::<2>::unit([10, 10]);
        Image::from_vec(data, &geometry, &Default::default()).unwrap()
    }

    struct Shift([f32; 2]);

    impl Transform<TestBackend, 2> for Shift {
        fn transform_points(&self, points: Tensor<TestBackend, 2>) -> Tensor<TestBackend, 2> {
            let offset = Tensor::<TestBackend, 1>::from_floats(self.0, &points.device()).reshape([1, 2]);
            points + offset
        }
    }

    #[test]
    fn test_resample_translation_2d_in_chunks() {
        let image = square_image();

        // Output (x, y) samples input (x - 2, y - 1): the square moves by (+2, +1)
        let filter = ResampleImageFilter::new_from_reference(&image, Shift([-2.0, -1.0]), LinearInterpolator::new())
            .with_chunk_size(7);
        let result = filter.apply(&image).unwrap().to_vec().unwrap();

        for idx in [56, 57, 66, 67] {
            assert!(result[idx] > 0.9, "voxel {} = {}", idx, result[idx]);
        }
        assert!(result[44] < 0.1);
        // Columns x < 2 sample outside the input and get the default value.
        assert_eq!(result[0], 0.0);
    }

    #[test]
    fn test_default_pixel_value_outside_field_of_view() {
        let image = square_image();
        let filter = ResampleImageFilter::new_from_reference(&image, Shift([100.0, 0.0]), NearestNeighborInterpolator::new())
            .with_default_pixel_value(-1024.0);
        let result = filter.apply(&image).unwrap().to_vec().unwrap();
        assert!(result.iter().all(|v| *v == -1024.0));
    }

    #[test]
    fn test_onto_other_grid() {
        let device = Default::default();
        let values: Vec<f32> = (0..64).map(|v| v as f32).collect();
        let input = Image::<TestBackend, 3>::from_vec(values, &ImageGeometry::unit([4, 4, 4]), &device).unwrap();

        // 2x2x2 output grid with spacing 2 samples every other input voxel.
        let geometry = ImageGeometry::new([2, 2, 2], Point::origin(), Spacing::uniform(2.0), Direction::identity());
        let filter = ResampleImageFilter::new(geometry, IdentityTransform, Interpolation::Linear);
        let output = filter.apply(&input).unwrap();

        assert_eq!(output.shape(), [2, 2, 2]);
        assert_eq!(output.spacing()[0], 2.0);
        let v = output.to_vec().unwrap();
        // flat (z, y, x) = 16 z + 4 y + x
        assert_eq!(v, vec![0.0, 2.0, 8.0, 10.0, 32.0, 34.0, 40.0, 42.0]);
    }

    #[test]
    fn test_label_volume_rejects_linear() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0], Shape::new([2, 2, 2])),
            &device,
        );
        let label = Volume::label(Image::on_grid(data, &ImageGeometry::unit([2, 2, 2])));
        let rotation = AffineMatrix::from_euler_degrees([0.0, 0.0, 30.0], &Point::new([0.5, 0.5, 0.5]));

        let linear = ResampleImageFilter::new(label.geometry(), rotation, Interpolation::Linear);
        match linear.apply_volume(&label) {
            Err(CoreError::KindViolation { kind, .. }) => assert!(kind.is_label()),
            other => panic!("expected kind violation, got {:?}", other.map(|v| v.kind())),
        }

        let nearest = ResampleImageFilter::new(label.geometry(), rotation, Interpolation::NearestNeighbor);
        let out = nearest.apply_volume(&label).unwrap();
        assert!(out.kind().is_label());
        assert!(out.is_binary().unwrap());
    }
}
