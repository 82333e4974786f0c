//! Transform types and operations.
//!
//! Transforms map reference-space physical points to moving-space physical
//! points. [`AffineTransform`] and [`BSplineTransform`] are trainable burn
//! modules; [`AffineMatrix`] is the persisted affine.

pub mod trait_;
pub mod affine;
pub mod bspline;

pub use trait_::{IdentityTransform, Transform};
pub use affine::{AffineMatrix, AffineTransform};
pub use bspline::BSplineTransform;
