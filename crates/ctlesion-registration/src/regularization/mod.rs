//! Penalty terms added to the similarity loss during optimization.
//!
//! * **BendingEnergyPenalty**: squared Laplacian of the B-spline control grid

pub mod trait_;
pub mod bending_energy;

pub use trait_::TransformPenalty;
pub use bending_energy::BendingEnergyPenalty;
