//! Optimizers that update trainable transforms from loss gradients.

pub mod trait_;
pub mod adam;

pub use trait_::Optimizer;
pub use adam::AdamOptimizer;
