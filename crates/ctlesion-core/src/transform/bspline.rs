//! B-Spline transform implementation.
//!
//! This module provides a cubic B-Spline free-form deformation transform
//! whose control grid is placed in physical space by an origin and a
//! control point spacing.

use burn::tensor::{Int, Tensor};
use burn::tensor::backend::Backend;
use burn::module::{Module, Param};
use crate::error::{CoreError, Result};
use crate::image::ImageGeometry;
use crate::spatial::Point;
use super::trait_::Transform;

/// B-Spline Transform (Free-form deformation).
///
/// Uses a grid of control points to define a smooth displacement field:
/// `T(x) = x + Σ β(u) c_k`. Control point `k = (i, j, l)` sits at
/// `grid_origin + (i, j, l) * control_point_spacing`, and coefficients are
/// stored with `x` varying fastest.
#[derive(Module, Debug)]
pub struct BSplineTransform<B: Backend, const D: usize> {
    /// Control point grid dimensions, index-axis order
    grid_size: [usize; D],
    /// Physical position of the first control point
    grid_origin: [f64; D],
    /// Spacing between control points
    control_point_spacing: [f64; D],
    /// Control point displacements [num_control_points, D]
    coefficients: Param<Tensor<B, 2>>,
}

impl<B: Backend, const D: usize> BSplineTransform<B, D> {
    /// Create a new B-Spline transform.
    ///
    /// # Arguments
    /// * `grid_size` - Number of control points along each axis
    /// * `grid_origin` - Physical position of control point `(0, .., 0)`
    /// * `control_point_spacing` - Physical distance between control points
    /// * `coefficients` - Control point displacements `[num_control_points, D]`
    pub fn new(
        grid_size: [usize; D],
        grid_origin: [f64; D],
        control_point_spacing: [f64; D],
        coefficients: Tensor<B, 2>,
    ) -> Self {
        Self {
            grid_size,
            grid_origin,
            control_point_spacing,
            coefficients: Param::from_tensor(coefficients),
        }
    }

    /// Zero-displacement transform whose control grid covers the physical
    /// bounding box of `geometry`, padded by one control point on each side
    /// plus the cubic support.
    pub fn for_domain(
        geometry: &ImageGeometry<D>,
        control_point_spacing: [f64; D],
        device: &B::Device,
    ) -> Result<Self> {
        if control_point_spacing.iter().any(|s| !(*s > 0.0) || !s.is_finite()) {
            return Err(CoreError::invalid_argument(format!(
                "control point spacing must be positive, got {:?}",
                control_point_spacing
            )));
        }

        let shape = geometry.shape();
        let mut lower = [f64::INFINITY; D];
        let mut upper = [f64::NEG_INFINITY; D];
        for corner in 0..(1usize << D) {
            // index axis i has extent shape[D - 1 - i]
            let index = Point::new(std::array::from_fn(|i| {
                if corner & (1 << i) != 0 {
                    shape[D - 1 - i].saturating_sub(1) as f64
                } else {
                    0.0
                }
            }));
            let p = geometry.index_to_physical(&index);
            for axis in 0..D {
                lower[axis] = lower[axis].min(p[axis]);
                upper[axis] = upper[axis].max(p[axis]);
            }
        }

        let grid_origin: [f64; D] = std::array::from_fn(|i| lower[i] - control_point_spacing[i]);
        let grid_size: [usize; D] = std::array::from_fn(|i| {
            ((upper[i] - lower[i]) / control_point_spacing[i]).ceil() as usize + 4
        });
        let num_control_points: usize = grid_size.iter().product();
        let coefficients = Tensor::<B, 2>::zeros([num_control_points, D], device);

        Ok(Self::new(grid_size, grid_origin, control_point_spacing, coefficients))
    }

    /// Get the grid size.
    pub fn grid_size(&self) -> [usize; D] {
        self.grid_size
    }

    /// Get the grid origin.
    pub fn grid_origin(&self) -> [f64; D] {
        self.grid_origin
    }

    /// Get the control point spacing.
    pub fn control_point_spacing(&self) -> [f64; D] {
        self.control_point_spacing
    }

    /// Get the coefficients.
    pub fn coefficients(&self) -> Tensor<B, 2> {
        self.coefficients.val()
    }

    /// Number of control points.
    pub fn num_control_points(&self) -> usize {
        self.grid_size.iter().product()
    }

    /// Compute Cubic B-Spline basis functions for `u` in `[0, 1)`.
    fn bspline_basis(u: Tensor<B, 1>) -> [Tensor<B, 1>; 4] {
        // B0 = (1-u)^3 / 6
        let one_minus_u = u.clone().neg().add_scalar(1.0);
        let b0 = one_minus_u.powf_scalar(3.0) / 6.0;

        // B1 = (3u^3 - 6u^2 + 4) / 6
        let u2 = u.clone().powf_scalar(2.0);
        let u3 = u.clone().powf_scalar(3.0);
        let b1 = (u3.clone().mul_scalar(3.0) - u2.clone().mul_scalar(6.0)).add_scalar(4.0) / 6.0;

        // B2 = (-3u^3 + 3u^2 + 3u + 1) / 6
        let b2 = (u3.clone().mul_scalar(-3.0) + u2.mul_scalar(3.0) + u.mul_scalar(3.0)).add_scalar(1.0) / 6.0;

        // B3 = u^3 / 6
        let b3 = u3 / 6.0;

        [b0, b1, b2, b3]
    }

    /// Basis values stacked into `[Batch, 4]`.
    fn compute_basis_tensor(u: Tensor<B, 1>) -> Tensor<B, 2> {
        let [b0, b1, b2, b3] = Self::bspline_basis(u);
        Tensor::cat(
            vec![
                b0.unsqueeze_dim::<2>(1),
                b1.unsqueeze_dim::<2>(1),
                b2.unsqueeze_dim::<2>(1),
                b3.unsqueeze_dim::<2>(1),
            ],
            1,
        )
    }

    /// Continuous control-grid coordinates of physical points.
    fn grid_coordinates(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin: Vec<f32> = self.grid_origin.iter().map(|v| *v as f32).collect();
        let spacing: Vec<f32> = self.control_point_spacing.iter().map(|v| *v as f32).collect();
        let origin = Tensor::<B, 1>::from_floats(origin.as_slice(), &device).reshape([1, D]);
        let spacing = Tensor::<B, 1>::from_floats(spacing.as_slice(), &device).reshape([1, D]);
        (points - origin) / spacing
    }

    fn transform_2d(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let batch_size = points.shape().dims[0];

        let grid_coords = self.grid_coordinates(points.clone());
        let grid_indices_float = grid_coords.clone().floor();
        let u_vec = grid_coords - grid_indices_float.clone();
        let base_index = grid_indices_float.int() - 1;

        let ux = u_vec.clone().slice([0..batch_size, 0..1]).squeeze(1);
        let uy = u_vec.slice([0..batch_size, 1..2]).squeeze(1);

        let bx = Self::compute_basis_tensor(ux);
        let by = Self::compute_basis_tensor(uy);

        // W[b, i, j] = Bx[b, i] * By[b, j], flattened to [Batch, 16, 1]
        let weights = bx.unsqueeze_dim::<3>(2) * by.unsqueeze_dim::<3>(1);
        let weights = weights.reshape([batch_size, 16, 1]);

        let nx = self.grid_size[0] as i32;
        let ny = self.grid_size[1] as i32;

        let range = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device);
        let i_idx = range.clone().reshape([1, 4, 1]);
        let j_idx = range.reshape([1, 1, 4]);

        let base_x = base_index.clone().slice([0..batch_size, 0..1]).unsqueeze_dim::<3>(2);
        let base_y = base_index.slice([0..batch_size, 1..2]).unsqueeze_dim::<3>(2);

        // Broadcast via addition with zeros
        let zeros = Tensor::<B, 3, Int>::zeros([1, 4, 4], &device);
        let idx_x = (base_x + i_idx + zeros.clone()).reshape([batch_size, 16]).clamp(0, nx - 1);
        let idx_y = (base_y + j_idx + zeros).reshape([batch_size, 16]).clamp(0, ny - 1);

        let flat_indices = idx_y * nx + idx_x;
        let coeffs = self
            .coefficients
            .val()
            .select(0, flat_indices.reshape([batch_size * 16]))
            .reshape([batch_size, 16, 2]);

        let displacement = (coeffs * weights).sum_dim(1).squeeze(1);
        points + displacement
    }

    fn transform_3d(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let batch_size = points.shape().dims[0];

        let grid_coords = self.grid_coordinates(points.clone());
        let grid_indices_float = grid_coords.clone().floor();
        let u_vec = grid_coords - grid_indices_float.clone();
        let base_index = grid_indices_float.int() - 1;

        let ux = u_vec.clone().slice([0..batch_size, 0..1]).squeeze(1);
        let uy = u_vec.clone().slice([0..batch_size, 1..2]).squeeze(1);
        let uz = u_vec.slice([0..batch_size, 2..3]).squeeze(1);

        let bx = Self::compute_basis_tensor(ux);
        let by = Self::compute_basis_tensor(uy);
        let bz = Self::compute_basis_tensor(uz);

        // W[b, i, j, k] = Bx[b, i] * By[b, j] * Bz[b, k], flattened to [Batch, 64, 1]
        let weights = bx.unsqueeze_dim::<3>(2).unsqueeze_dim::<4>(3)
            * by.unsqueeze_dim::<3>(1).unsqueeze_dim::<4>(3)
            * bz.unsqueeze_dim::<3>(1).unsqueeze_dim::<4>(1);
        let weights = weights.reshape([batch_size, 64, 1]);

        let nx = self.grid_size[0] as i32;
        let ny = self.grid_size[1] as i32;
        let nz = self.grid_size[2] as i32;

        let range = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device);
        let i_idx = range.clone().reshape([1, 4, 1, 1]);
        let j_idx = range.clone().reshape([1, 1, 4, 1]);
        let k_idx = range.reshape([1, 1, 1, 4]);

        let base_x = base_index.clone().slice([0..batch_size, 0..1]).unsqueeze_dim::<3>(2).unsqueeze_dim::<4>(3);
        let base_y = base_index.clone().slice([0..batch_size, 1..2]).unsqueeze_dim::<3>(2).unsqueeze_dim::<4>(3);
        let base_z = base_index.slice([0..batch_size, 2..3]).unsqueeze_dim::<3>(2).unsqueeze_dim::<4>(3);

        let zeros = Tensor::<B, 4, Int>::zeros([1, 4, 4, 4], &device);
        let idx_x = (base_x + i_idx + zeros.clone()).reshape([batch_size, 64]).clamp(0, nx - 1);
        let idx_y = (base_y + j_idx + zeros.clone()).reshape([batch_size, 64]).clamp(0, ny - 1);
        let idx_z = (base_z + k_idx + zeros).reshape([batch_size, 64]).clamp(0, nz - 1);

        // Flat index = z * (Nx * Ny) + y * Nx + x
        let flat_indices = idx_z * (nx * ny) + idx_y * nx + idx_x;
        let coeffs = self
            .coefficients
            .val()
            .select(0, flat_indices.reshape([batch_size * 64]))
            .reshape([batch_size, 64, 3]);

        let displacement = (coeffs * weights).sum_dim(1).squeeze(1);
        points + displacement
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for BSplineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        match D {
            2 => self.transform_2d(points),
            3 => self.transform_3d(points),
            _ => panic!("BSplineTransform only supports 2D and 3D"),
        }
    }
}
