//! Image type with physical metadata and coordinate transformations.
//!
//! This module provides the Image struct which represents medical images
//! with tensor data and physical space metadata (origin, spacing, direction).

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing};
use super::geometry::ImageGeometry;

/// Medical image with physical metadata.
///
/// The Image type combines tensor data with physical space metadata that
/// describes how voxel indices map to physical coordinates.
///
/// # Type Parameters
/// * `B` - The backend for tensor operations
/// * `D` - The dimensionality of the image (2 or 3)
///
/// # Coordinate Systems
/// * **Index Space**: voxel indices `(x, y, z)`; the tensor itself is laid out `[Z, Y, X]`
/// * **Physical Space**: continuous coordinates in millimetres
///
/// # Examples
/// ```rust
/// use ctlesion_core::Image;
/// use ctlesion_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(1.0), Direction3::identity());
/// assert_eq!(image.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Create an image from voxel values laid out `[Z, Y, X]` on a given grid.
    pub fn from_vec(values: Vec<f32>, geometry: &ImageGeometry<D>, device: &B::Device) -> Result<Self> {
        if values.len() != geometry.num_voxels() {
            return Err(CoreError::invalid_argument(format!(
                "expected {} voxel values for shape {:?}, got {}",
                geometry.num_voxels(),
                geometry.shape(),
                values.len()
            )));
        }
        let data = Tensor::<B, D>::from_data(TensorData::new(values, Shape::new(geometry.shape())), device);
        Ok(Self::on_grid(data, geometry))
    }

    /// Create an image sharing the given geometry.
    pub fn on_grid(data: Tensor<B, D>, geometry: &ImageGeometry<D>) -> Self {
        Self::new(data, *geometry.origin(), *geometry.spacing(), *geometry.direction())
    }

    /// Replace the voxel data, keeping the physical metadata.
    pub fn with_data(&self, data: Tensor<B, D>) -> Self {
        Self::new(data, self.origin, self.spacing, self.direction)
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Take ownership of the data tensor.
    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    /// Get the origin (physical coordinate of first voxel).
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing (physical distance between voxels).
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction (orientation matrix).
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Get the image shape in tensor order.
    pub fn shape(&self) -> [usize; D] {
        let dims = self.data.shape().dims;
        std::array::from_fn(|i| dims[i])
    }

    /// Grid geometry of this image.
    pub fn geometry(&self) -> ImageGeometry<D> {
        ImageGeometry::new(self.shape(), self.origin, self.spacing, self.direction)
    }

    /// Copy the voxel values to the host, `[Z, Y, X]` order.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        crate::util::to_host_vec(self.data.clone())
    }

    /// Convert a continuous physical point to a continuous index.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Result<Point<D>> {
        self.geometry().physical_to_index(point)
    }

    /// Convert a continuous index to a physical point.
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        self.geometry().index_to_physical(index)
    }

    /// Batch transform physical points to continuous indices.
    ///
    /// # Arguments
    /// * `points` - A tensor of shape `[Batch, D]` containing physical points
    ///
    /// # Returns
    /// A tensor of shape `[Batch, D]` containing continuous indices
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        self.geometry().world_to_index_tensor(points)
    }

    /// Batch transform continuous indices to physical points.
    ///
    /// # Arguments
    /// * `indices` - A tensor of shape `[Batch, D]` containing continuous indices
    ///
    /// # Returns
    /// A tensor of shape `[Batch, D]` containing physical points
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry().index_to_world_tensor(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;
    type Point3 = Point<3>;
    type Spacing3 = Spacing<3>;
    type Direction3 = Direction<3>;

    fn image_with(origin: Point3, spacing: Spacing3) -> Image<Backend, 3> {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
        Image::new(data, origin, spacing, Direction3::identity())
    }

    #[test]
    fn test_image_creation() {
        let image = image_with(Point3::origin(), Spacing3::uniform(1.0));
        assert_eq!(image.shape(), [10, 10, 10]);
        assert_eq!(image.geometry().num_voxels(), 1000);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let device = Default::default();
        let geometry = ImageGeometry::<3>::unit([2, 2, 2]);
        assert!(Image::<Backend, 3>::from_vec(vec![0.0; 7], &geometry, &device).is_err());
        let image = Image::<Backend, 3>::from_vec((0..8).map(|v| v as f32).collect(), &geometry, &device).unwrap();
        assert_eq!(image.to_vec().unwrap()[7], 7.0);
    }

    #[test]
    fn test_non_zero_origin_and_spacing() {
        let image = image_with(Point3::new([10.0, 20.0, 30.0]), Spacing3::uniform(2.0));
        let index = image
            .transform_physical_point_to_continuous_index(&Point3::new([20.0, 30.0, 40.0]))
            .unwrap();
        assert!(index.approx_eq(&Point3::new([5.0, 5.0, 5.0]), 1e-6));
    }

    #[test]
    fn test_tensor_mapping_roundtrip() {
        let device = Default::default();
        let image = image_with(Point3::new([1.0, -2.0, 3.0]), Spacing3::new([0.5, 1.0, 2.0]));
        let indices = Tensor::<Backend, 2>::from_floats([[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]], &device);

        let world = image.index_to_world_tensor(indices);
        let world_data = world.clone().into_data();
        let w = world_data.as_slice::<f32>().unwrap();
        assert!((w[0] - 1.5).abs() < 1e-6);
        assert!((w[1] - 0.0).abs() < 1e-6);
        assert!((w[2] - 9.0).abs() < 1e-6);

        let back = image.world_to_index_tensor(world).unwrap().into_data();
        let b = back.as_slice::<f32>().unwrap();
        assert!((b[0] - 1.0).abs() < 1e-5);
        assert!((b[1] - 2.0).abs() < 1e-5);
        assert!((b[2] - 3.0).abs() < 1e-5);
        assert!(b[3].abs() < 1e-5);
    }
}
