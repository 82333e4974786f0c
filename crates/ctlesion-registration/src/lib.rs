//! Registration engines for ctlesion.
//!
//! * [`MutualInformationAffineSolver`]: 12-parameter affine, coarse rotation
//!   scan followed by Adam refinement.
//! * [`BSplineSolver`]: masked cubic B-spline free-form deformation.
//!
//! Both optimise Mattes mutual information through the generic
//! [`Registration`] loop.

pub mod error;
pub mod metric;
pub mod optimizer;
pub mod regularization;
pub mod validation;
pub mod registration;
pub mod affine;
pub mod deformable;

pub use error::{RegistrationError, Result};
pub use registration::{Registration, RegistrationOutcome};
pub use affine::{center_of_mass, AffineSearchConfig, AffineSolver, MutualInformationAffineSolver};
pub use deformable::{BSplineConfig, BSplineSolver, DeformableRegistration, DeformableSolver, DeformableTransform};
