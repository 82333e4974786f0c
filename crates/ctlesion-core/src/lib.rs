pub mod error;
pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;
pub mod util;

pub use error::{CoreError, Result};
pub use image::{Image, ImageGeometry, Volume, VolumeKind};
pub use spatial::{Direction, Point, Spacing, Vector};
