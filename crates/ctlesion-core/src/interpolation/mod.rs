//! Interpolation types and operations.
//!
//! This module provides interpolation traits and implementations
//! for sampling values at continuous coordinates.

pub mod trait_;
pub mod linear;
pub mod nearest;
pub mod bspline;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use crate::error::Result;

pub use trait_::Interpolator;
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
pub use bspline::BSplineInterpolator;

/// Interpolation selected by a resampling order.
///
/// Order 0 is nearest neighbour, order 1 is (tri)linear, any higher order
/// uses the cubic B-spline interpolator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    NearestNeighbor,
    Linear,
    CubicBSpline,
}

impl Interpolation {
    pub fn from_order(order: u32) -> Self {
        match order {
            0 => Self::NearestNeighbor,
            1 => Self::Linear,
            _ => Self::CubicBSpline,
        }
    }

    pub fn order(self) -> u32 {
        match self {
            Self::NearestNeighbor => 0,
            Self::Linear => 1,
            Self::CubicBSpline => 3,
        }
    }
}

impl<B: Backend> Interpolator<B> for Interpolation {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::NearestNeighbor => NearestNeighborInterpolator.interpolate(data, indices),
            Self::Linear => LinearInterpolator.interpolate(data, indices),
            Self::CubicBSpline => BSplineInterpolator.interpolate(data, indices),
        }
    }

    fn prefilter<const D: usize>(&self, data: Tensor<B, D>) -> Result<Tensor<B, D>> {
        match self {
            Self::CubicBSpline => Interpolator::<B>::prefilter(&BSplineInterpolator, data),
            _ => Ok(data),
        }
    }

    fn preserves_labels(&self) -> bool {
        matches!(self, Self::NearestNeighbor)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NearestNeighbor => Interpolator::<B>::name(&NearestNeighborInterpolator),
            Self::Linear => Interpolator::<B>::name(&LinearInterpolator),
            Self::CubicBSpline => Interpolator::<B>::name(&BSplineInterpolator),
        }
    }
}
