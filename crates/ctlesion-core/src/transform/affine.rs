//! Affine transforms.
//!
//! [`AffineTransform`] is the trainable form used by the solvers (burn
//! parameters, differentiable). [`AffineMatrix`] is the persisted form: a
//! 4×4 homogeneous matrix in `f64` that is computed once per run and reused
//! by every apply call.

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use crate::error::{CoreError, Result};
use crate::spatial::Point;
use crate::util::to_host_vec;
use super::trait_::Transform;

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a D×D matrix (linear transformation: rotation, scale, shear)
/// * t is a D-dimensional translation vector
/// * c is a D-dimensional fixed center of rotation/scaling
///
/// The trained translation parameter holds `t / translation_scale`.
#[derive(Module, Debug)]
pub struct AffineTransform<B: Backend, const D: usize> {
    matrix: Param<Tensor<B, 2>>,      // [D, D]
    translation: Param<Tensor<B, 1>>, // [D], in units of translation_scale
    center: Tensor<B, 1>,             // [D], not trained
    translation_scale: f64,
}

impl<B: Backend, const D: usize> AffineTransform<B, D> {
    /// Create a new affine transform from `[D, D]` matrix, `[D]` translation
    /// and `[D]` center tensors.
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>, center: Tensor<B, 1>) -> Self {
        Self {
            matrix: Param::from_tensor(matrix),
            translation: Param::from_tensor(translation),
            center,
            translation_scale: 1.0,
        }
    }

    /// Re-express the translation parameter in units of `scale`.
    ///
    /// The mapping is unchanged. Call before optimization, since the
    /// translation parameter is replaced.
    pub fn with_translation_scale(mut self, scale: f64) -> Self {
        let physical = self.translation();
        self.translation = Param::from_tensor(physical / scale);
        self.translation_scale = scale;
        self
    }

    pub fn translation_scale(&self) -> f64 {
        self.translation_scale
    }

    /// Create an identity affine transform about `center` (origin if `None`).
    pub fn identity(center: Option<Tensor<B, 1>>, device: &B::Device) -> Self {
        let matrix = Tensor::<B, 2>::eye(D, device);
        let translation = Tensor::<B, 1>::zeros([D], device);
        let center = center.unwrap_or_else(|| Tensor::<B, 1>::zeros([D], device));
        Self::new(matrix, translation, center)
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.val()
    }

    /// Get the translation vector in physical units.
    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.val() * self.translation_scale
    }

    /// Get the center of rotation.
    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }
}

impl<B: Backend> AffineTransform<B, 3> {
    /// Build the trainable form of `affine`, parameterised about `center`.
    ///
    /// The mapping is unchanged: only the split between `A`, `t` and `c`
    /// depends on the center.
    pub fn from_affine_matrix(affine: &AffineMatrix, center: &Point<3>, device: &B::Device) -> Self {
        let linear = affine.linear();
        let c = Vector3::new(center[0], center[1], center[2]);
        // A x + o = A (x - c) + c + t  =>  t = o + A c - c
        let t = affine.offset() + linear * c - c;

        let mut matrix_data = Vec::with_capacity(9);
        for r in 0..3 {
            for col in 0..3 {
                matrix_data.push(linear[(r, col)] as f32);
            }
        }
        let matrix = Tensor::<B, 1>::from_data(TensorData::new(matrix_data, Shape::new([9])), device).reshape([3, 3]);
        let translation = Tensor::<B, 1>::from_floats([t[0] as f32, t[1] as f32, t[2] as f32], device);
        let center = Tensor::<B, 1>::from_floats([c[0] as f32, c[1] as f32, c[2] as f32], device);
        Self::new(matrix, translation, center)
    }

    /// Read the current parameters back into a persisted [`AffineMatrix`].
    pub fn to_affine_matrix(&self) -> Result<AffineMatrix> {
        let a = to_host_vec(self.matrix.val())?;
        let t = to_host_vec(self.translation())?;
        let c = to_host_vec(self.center.clone())?;
        if a.len() != 9 || t.len() != 3 || c.len() != 3 {
            return Err(CoreError::TensorData("affine parameters have unexpected shapes".into()));
        }
        let linear = Matrix3::from_fn(|r, col| a[r * 3 + col] as f64);
        let translation = Vector3::new(t[0] as f64, t[1] as f64, t[2] as f64);
        let center = Vector3::new(c[0] as f64, c[1] as f64, c[2] as f64);
        Ok(AffineMatrix::from_parts(linear, translation, center))
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for AffineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vector notation for [N, D] inputs: y = (x - c) @ A^T + c + t
        let c = self.center.clone().reshape([1, D]);
        let t = self.translation().reshape([1, D]);
        let a = self.matrix.val();

        let centered = points - c.clone();
        centered.matmul(a.transpose()) + c + t
    }
}

/// Persisted 3D affine: a homogeneous matrix acting on physical points.
///
/// `y = M[0..3, 0..3] x + M[0..3, 3]`. The bottom row is always `[0, 0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineMatrix(Matrix4<f64>);

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineMatrix {
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Build from `T(x) = A (x - c) + c + t`.
    pub fn from_parts(linear: Matrix3<f64>, translation: Vector3<f64>, center: Vector3<f64>) -> Self {
        let offset = center + translation - linear * center;
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        Self(m)
    }

    /// Build from row-major homogeneous rows, validating the bottom row.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Result<Self> {
        let bottom = rows[3];
        let expected = [0.0, 0.0, 0.0, 1.0];
        if bottom.iter().zip(expected.iter()).any(|(a, b)| (a - b).abs() > 1e-9) {
            return Err(CoreError::invalid_argument(format!(
                "affine bottom row must be [0, 0, 0, 1], got {:?}",
                bottom
            )));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CoreError::invalid_argument("affine contains non-finite values"));
        }
        Ok(Self(Matrix4::from_fn(|r, c| rows[r][c])))
    }

    /// Rotation about `center` by Euler angles in degrees around `x`, `y`
    /// and `z`, composed as `R = Rz · Ry · Rx`.
    pub fn from_euler_degrees(angles: [f64; 3], center: &Point<3>) -> Self {
        let [ax, ay, az] = angles.map(f64::to_radians);
        let (sx, cx) = ax.sin_cos();
        let (sy, cy) = ay.sin_cos();
        let (sz, cz) = az.sin_cos();
        let rotation = Matrix3::new(
            cz * cy, cz * sy * sx - sz * cx, cz * sy * cx + sz * sx,
            sz * cy, sz * sy * sx + cz * cx, sz * sy * cx - cz * sx,
            -sy, cy * sx, cy * cx,
        );
        let c = Vector3::new(center[0], center[1], center[2]);
        Self::from_parts(rotation, Vector3::zeros(), c)
    }

    /// Pure translation.
    pub fn from_translation(offset: [f64; 3]) -> Self {
        Self::from_parts(Matrix3::identity(), Vector3::from(offset), Vector3::zeros())
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        std::array::from_fn(|r| std::array::from_fn(|c| self.0[(r, c)]))
    }

    /// Upper-left 3×3 block.
    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Translation column.
    pub fn offset(&self) -> Vector3<f64> {
        self.0.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// `self ∘ first`: apply `first`, then `self`.
    pub fn compose(&self, first: &AffineMatrix) -> Self {
        Self(self.0 * first.0)
    }

    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn transform_point(&self, point: &Point<3>) -> Point<3> {
        let y = self.linear() * Vector3::new(point[0], point[1], point[2]) + self.offset();
        Point::new([y[0], y[1], y[2]])
    }

    /// Largest absolute element-wise difference to `other`.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        (self.0 - other.0).abs().max()
    }
}

impl<B: Backend> Transform<B, 3> for AffineMatrix {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let linear = self.linear();
        let offset = self.offset();

        // y = x @ A^T + o
        let mut at = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                at.push(linear[(c, r)] as f32);
            }
        }
        let at = Tensor::<B, 1>::from_data(TensorData::new(at, Shape::new([9])), &device).reshape([3, 3]);
        let o = Tensor::<B, 1>::from_floats([offset[0] as f32, offset[1] as f32, offset[2] as f32], &device)
            .reshape([1, 3]);
        points.matmul(at) + o
    }
}
