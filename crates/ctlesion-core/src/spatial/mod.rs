//! Spatial types: points, vectors, spacing and direction matrices.
//!
//! All types wrap nalgebra statics so that geometry bookkeeping stays on the
//! CPU in `f64`, while voxel data lives in burn tensors.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::Direction;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;

/// Tolerance used when two geometries are compared for grid identity.
pub const GEOMETRY_TOLERANCE: f64 = 1e-4;
