//! Voxel grid geometry.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing, Vector, GEOMETRY_TOLERANCE};

/// Physical description of a voxel grid.
///
/// `shape` follows tensor order (slowest axis first, `[Z, Y, X]` in 3D),
/// while `origin`, `spacing` and `direction` follow index-axis order
/// (`x` first), matching the layout of [`crate::Image`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry<const D: usize> {
    shape: [usize; D],
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

impl<const D: usize> ImageGeometry<D> {
    pub fn new(shape: [usize; D], origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            shape,
            origin,
            spacing,
            direction,
        }
    }

    /// Unit spacing, zero origin and identity direction.
    pub fn unit(shape: [usize; D]) -> Self {
        Self::new(shape, Point::origin(), Spacing::uniform(1.0), Direction::identity())
    }

    pub fn shape(&self) -> [usize; D] {
        self.shape
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.shape.iter().product()
    }

    /// Map a continuous index `(x, y, ...)` to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn index_to_physical(&self, index: &Point<D>) -> Point<D> {
        let mut scaled = Vector::<D>::zeros();
        for i in 0..D {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// Map a physical point to a continuous index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    pub fn physical_to_index(&self, point: &Point<D>) -> Result<Point<D>> {
        let inv_dir = self.direction.try_inverse().ok_or(CoreError::SingularDirection)?;
        let rotated = inv_dir * (*point - self.origin);
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        Ok(index)
    }

    /// Batch transform continuous indices `[Batch, D]` to physical points.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();

        // P = O + I @ M with M[r, c] = S[r] * D[c, r]
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m_tensor = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

        indices.matmul(m_tensor) + self.origin_tensor(&device)
    }

    /// Batch transform physical points `[Batch, D]` to continuous indices.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let device = points.device();

        // I = (P - O) @ T with T[r, c] = (D^-1)[c, r] / S[c]
        let inv_dir = self.direction.try_inverse().ok_or(CoreError::SingularDirection)?;
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t_tensor = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        Ok((points - self.origin_tensor(&device)).matmul(t_tensor))
    }

    fn origin_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D])
    }

    /// Physical position of the grid centre.
    pub fn center(&self) -> Point<D> {
        let mut index = Point::<D>::origin();
        for i in 0..D {
            // index axis i is tensor axis D - 1 - i
            index[i] = (self.shape[D - 1 - i] as f64 - 1.0) / 2.0;
        }
        self.index_to_physical(&index)
    }

    /// Whether two geometries describe the same voxel grid.
    pub fn same_grid(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self.origin.approx_eq(&other.origin, GEOMETRY_TOLERANCE)
            && self.spacing.approx_eq(&other.spacing, GEOMETRY_TOLERANCE)
            && self.direction.approx_eq(&other.direction, GEOMETRY_TOLERANCE)
    }

    /// Fail with [`CoreError::GridMismatch`] unless both geometries match.
    pub fn ensure_same_grid(&self, other: &Self, operation: &'static str) -> Result<()> {
        if self.shape != other.shape {
            return Err(CoreError::grid_mismatch(
                operation,
                format!("shape {:?} vs {:?}", self.shape, other.shape),
            ));
        }
        if !self.same_grid(other) {
            return Err(CoreError::grid_mismatch(
                operation,
                format!(
                    "origin/spacing/direction differ (origin {:?} vs {:?})",
                    self.origin.to_array(),
                    other.origin.to_array()
                ),
            ));
        }
        Ok(())
    }
}
