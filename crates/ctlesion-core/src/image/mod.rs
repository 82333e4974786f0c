//! Image and volume types.
//!
//! An [`Image`] couples a burn tensor with the physical geometry of its
//! voxel grid; a [`Volume`] additionally records whether the voxels carry
//! continuous intensities or binary labels.

pub mod image;
pub mod geometry;
pub mod grid;
pub mod volume;

pub use image::Image;
pub use geometry::ImageGeometry;
pub use grid::{generate_grid, generate_grid_chunk};
pub use volume::{Volume, VolumeKind};
